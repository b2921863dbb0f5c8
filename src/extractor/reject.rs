use serde::Serialize;

pub const MIN_TITLE_CHARS: usize = 5;
pub const MIN_BODY_CHARS: usize = 50;
const MIN_PRINTABLE_RATIO: f64 = 0.2;
const MIN_MEANINGFUL_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    TooShort,
    Garbage,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::Garbage => "garbage",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub reason: Option<RejectReason>,
}

impl Validation {
    fn accept() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

/// Minimum-quality rules applied to every cleaned candidate before storage.
pub fn validate(title: &str, body: &str) -> Validation {
    let title = title.trim();
    let body = body.trim();

    if title.is_empty() || body.is_empty() {
        return Validation::reject(RejectReason::Empty);
    }

    let title_stats = CharStats::of(title);
    let body_stats = CharStats::of(body);

    if title_stats.printable < MIN_TITLE_CHARS || body_stats.printable < MIN_BODY_CHARS {
        return Validation::reject(RejectReason::TooShort);
    }

    if body_stats.is_garbage() || title_stats.is_garbage() {
        return Validation::reject(RejectReason::Garbage);
    }

    Validation::accept()
}

struct CharStats {
    total: usize,
    printable: usize,
    meaningful: usize,
}

impl CharStats {
    fn of(text: &str) -> Self {
        let mut stats = Self {
            total: 0,
            printable: 0,
            meaningful: 0,
        };
        for c in text.chars() {
            stats.total += 1;
            if is_printable(c) {
                stats.printable += 1;
                if c.is_alphanumeric() {
                    stats.meaningful += 1;
                }
            }
        }
        stats
    }

    fn is_garbage(&self) -> bool {
        if self.total == 0 || self.printable == 0 {
            return true;
        }
        let printable_ratio = self.printable as f64 / self.total as f64;
        let meaningful_ratio = self.meaningful as f64 / self.printable as f64;
        printable_ratio < MIN_PRINTABLE_RATIO || meaningful_ratio < MIN_MEANINGFUL_RATIO
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control()
        && !matches!(c, '\u{FFFD}' | '\u{FEFF}' | '\u{200B}'..='\u{200F}')
        && !('\u{E000}'..='\u{F8FF}').contains(&c)
}
