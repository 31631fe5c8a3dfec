#![forbid(unsafe_code)]

pub mod ids {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum EntityIdError {
        Empty,
        TooLong,
        InvalidChar { ch: char, index: usize },
    }

    /// Entity ids are opaque but must stay printable and bounded so they can
    /// travel through documents and SQL keys unmangled.
    pub fn validate_entity_id(value: &str) -> Result<(), EntityIdError> {
        if value.is_empty() {
            return Err(EntityIdError::Empty);
        }
        if value.len() > 256 {
            return Err(EntityIdError::TooLong);
        }
        for (index, ch) in value.chars().enumerate() {
            if ch.is_control() || ch.is_whitespace() {
                return Err(EntityIdError::InvalidChar { ch, index });
            }
        }
        Ok(())
    }
}

pub mod model {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum TrackerKind {
        Count,
        Duration,
        Amount,
        Custom,
    }

    impl TrackerKind {
        pub fn as_str(self) -> &'static str {
            match self {
                TrackerKind::Count => "count",
                TrackerKind::Duration => "duration",
                TrackerKind::Amount => "amount",
                TrackerKind::Custom => "custom",
            }
        }

        /// Unknown wire kinds collapse to `Custom` rather than failing the
        /// whole payload (forward compatibility with newer exporters).
        pub fn from_wire(value: &str) -> Self {
            match value.trim() {
                "count" => TrackerKind::Count,
                "duration" => TrackerKind::Duration,
                "amount" => TrackerKind::Amount,
                _ => TrackerKind::Custom,
            }
        }
    }

    /// A named quantity being tracked. `parent_id` forms a forest: entries
    /// recorded on a child contribute to each ancestor. A missing parent is
    /// an orphan, not an error.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Tracker {
        pub id: String,
        pub title: String,
        pub kind: TrackerKind,
        pub is_number: bool,
        pub goal: Option<i64>,
        pub parent_id: Option<String>,
        pub updated_at_ms: Option<i64>,
        pub deleted_at_ms: Option<i64>,
    }

    /// One recorded observation. `created_at_ms` doubles as the logical
    /// version: an edit is a replacement entity with the same id and a newer
    /// `created_at_ms`, never an in-place mutation.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Entry {
        pub id: String,
        pub tracker_id: String,
        pub date: String,
        pub value: i64,
        pub comment: Option<String>,
        pub created_at_ms: i64,
        pub deleted_at_ms: Option<i64>,
    }

    impl Entry {
        pub fn is_deleted(&self) -> bool {
            self.deleted_at_ms.is_some()
        }
    }

    impl Tracker {
        pub fn is_deleted(&self) -> bool {
            self.deleted_at_ms.is_some()
        }
    }

    /// Association between an entry and a normalized label extracted from
    /// its comment. No lifecycle of its own beyond the owning entry.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Tag {
        pub id: String,
        pub entry_id: String,
        pub tracker_id: String,
        pub tag_name: String,
        pub tag_name_original: Option<String>,
    }
}

pub mod dates {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum DateError {
        BadShape,
        BadMonth,
        BadDay,
    }

    fn is_leap_year(year: i64) -> bool {
        (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
    }

    fn days_in_month(year: i64, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /// Validates a calendar date in `yyyy-MM-dd` form (no time component).
    pub fn validate_date(value: &str) -> Result<(), DateError> {
        let bytes = value.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(DateError::BadShape);
        }
        let year: i64 = value[0..4].parse().map_err(|_| DateError::BadShape)?;
        let month: u8 = value[5..7].parse().map_err(|_| DateError::BadShape)?;
        let day: u8 = value[8..10].parse().map_err(|_| DateError::BadShape)?;
        if !(1..=12).contains(&month) {
            return Err(DateError::BadMonth);
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(DateError::BadDay);
        }
        Ok(())
    }

    pub fn is_valid_date(value: &str) -> bool {
        validate_date(value).is_ok()
    }
}

pub mod tags {
    /// An inline tag token from an entry comment: the normalized lower-case
    /// name plus the casing it was written with.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct TagToken {
        pub normalized: String,
        pub original: String,
    }

    fn is_tag_char(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '-'
    }

    /// Extracts `#tag` tokens from a free-text comment. Tokens start with an
    /// alphanumeric character after the `#`, continue over alphanumerics,
    /// `_` and `-`, and are deduplicated by normalized name keeping the
    /// first-seen casing.
    pub fn extract_tags(comment: &str) -> Vec<TagToken> {
        let mut out: Vec<TagToken> = Vec::new();
        let chars: Vec<char> = comment.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '#' {
                i += 1;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_tag_char(chars[end]) {
                end += 1;
            }
            if end > start && chars[start].is_alphanumeric() {
                let original: String = chars[start..end].iter().collect();
                let normalized = original.to_lowercase();
                if !out.iter().any(|t| t.normalized == normalized) {
                    out.push(TagToken {
                        normalized,
                        original,
                    });
                }
            }
            i = end.max(i + 1);
        }
        out
    }
}
