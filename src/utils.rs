use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use num_format::{Locale, ToFormattedString};

use crate::config::FormattingConfig;

static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

pub fn warn_once(message: impl Into<String>) {
    let message = message.into();
    let cache = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));

    if let Ok(mut warned) = cache.lock()
        && warned.insert(message.clone())
    {
        eprintln!("{message}");
    }
}

#[derive(Clone)]
pub struct NumberFormatOptions {
    pub use_comma: bool,
    pub use_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl From<&FormattingConfig> for NumberFormatOptions {
    fn from(formatting: &FormattingConfig) -> Self {
        Self {
            use_comma: formatting.number_comma,
            use_human: formatting.number_human,
            locale: formatting.locale.clone(),
            decimal_places: formatting.decimal_places,
        }
    }
}

/// Format a number for display.
pub fn format_number(n: impl TryInto<u64>, options: &NumberFormatOptions) -> String {
    let n: u64 = n.try_into().unwrap_or(u64::MAX);
    let locale = match options.locale.as_str() {
        "de" => Locale::de,
        "fr" => Locale::fr,
        "es" => Locale::es,
        "it" => Locale::it,
        "ja" => Locale::ja,
        "ko" => Locale::ko,
        "zh" => Locale::zh,
        _ => Locale::en,
    };

    if options.use_human {
        let (value, suffix) = match n {
            1_000_000_000_000.. => (n as f64 / 1_000_000_000_000.0, "t"),
            1_000_000_000.. => (n as f64 / 1_000_000_000.0, "b"),
            1_000_000.. => (n as f64 / 1_000_000.0, "m"),
            1_000.. => (n as f64 / 1_000.0, "k"),
            _ => return n.to_string(),
        };
        format!("{value:.prec$}{suffix}", prec = options.decimal_places)
    } else if options.use_comma {
        n.to_formatted_string(&locale)
    } else {
        n.to_string()
    }
}
