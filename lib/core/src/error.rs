//! Error handling foundation for the weft workflow engine.
//!
//! Only the `Result` alias lives here. Each crate defines its own domain
//! error types and converts them into a rootcause `Report` at the boundary
//! where a caller needs layered context.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct LoadFailed;

    impl fmt::Display for LoadFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "load failed")
        }
    }

    impl std::error::Error for LoadFailed {}

    fn load(ok: bool) -> Result<u32, LoadFailed> {
        if ok {
            Ok(7)
        } else {
            Err(LoadFailed)?
        }
    }

    #[test]
    fn ok_values_pass_through() {
        assert_eq!(load(true).expect("should be ok"), 7);
    }

    #[test]
    fn domain_errors_convert_into_reports() {
        let report = load(false).unwrap_err();
        assert!(report.to_string().contains("load failed"));
    }
}
