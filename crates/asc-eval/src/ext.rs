//! Process-wide extension slots for the optional formatters.
//!
//! The country/currency/phone formatters depend on host data (locale tables,
//! a phone-number library) that the core never fetches itself. Hosts install
//! callables into this singleton; while a slot is unset, the corresponding
//! stdlib function returns `null`. Writes are host-serialized; reads happen
//! from inside stdlib calls on the evaluating thread.

use std::sync::RwLock;

type CountryNameFn = dyn Fn(&str) -> Option<String> + Send + Sync;
type FormatCurrencyFn = dyn Fn(&str, u32, f64) -> String + Send + Sync;
type FormatPhoneFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// The three optional formatter slots.
#[derive(Default)]
pub struct Extensions {
    /// ISO country code to display name.
    pub country_name: Option<Box<CountryNameFn>>,
    /// `(code, minor_units, amount)` to a locale-formatted currency string.
    pub format_currency: Option<Box<FormatCurrencyFn>>,
    /// Phone number to international display format.
    pub format_phone: Option<Box<FormatPhoneFn>>,
}

static EXTENSIONS: RwLock<Extensions> = RwLock::new(Extensions {
    country_name: None,
    format_currency: None,
    format_phone: None,
});

/// Install or replace extension slots.
pub fn configure(configure: impl FnOnce(&mut Extensions)) {
    if let Ok(mut slots) = EXTENSIONS.write() {
        configure(&mut slots);
    }
}

/// Clear every slot. Intended for host teardown and tests.
pub fn reset() {
    configure(|slots| {
        slots.country_name = None;
        slots.format_currency = None;
        slots.format_phone = None;
    });
}

/// Serializes tests that touch the process-wide slots.
#[cfg(test)]
pub(crate) static TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Read the current slots. A poisoned lock behaves as if no slot were set.
pub(crate) fn with<R>(read: impl FnOnce(&Extensions) -> R) -> R {
    match EXTENSIONS.read() {
        Ok(slots) => read(&slots),
        Err(_) => read(&Extensions::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_empty_and_can_be_installed() {
        let _guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        reset();
        assert!(with(|slots| slots.country_name.is_none()));

        configure(|slots| {
            slots.country_name = Some(Box::new(|code| {
                (code == "NL").then(|| "Netherlands".to_string())
            }));
        });
        let resolved = with(|slots| {
            slots
                .country_name
                .as_ref()
                .and_then(|f| f("NL"))
        });
        assert_eq!(resolved.as_deref(), Some("Netherlands"));
        reset();
    }
}
