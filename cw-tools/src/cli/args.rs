pub use clap::{App, Arg};
pub use inflector::Inflector;

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::args::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use inflector::Inflector;
        $crate::cli::args::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use inflector::Inflector;
        $crate::cli::args::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// A flag that takes no value.
#[macro_export]
macro_rules! flag {
    ($name:expr) => {{
        use inflector::Inflector;
        $crate::cli::args::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .takes_value(false)
    }};
}

/// Split a multi-valued option such as `VAR1/VAR2` or
/// `ROWS/COLS`.
pub fn split_values(value: &str) -> Vec<&str> {
    value.split('/').filter(|v| !v.is_empty()).collect()
}

/// Parse `ROWS/COLS`.
pub fn parse_dims(value: &str) -> Option<[usize; 2]> {
    match split_values(value)[..] {
        [rows, cols] => Some([rows.parse().ok()?, cols.parse().ok()?]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_values() {
        assert_eq!(split_values("sst/quality"), vec!["sst", "quality"]);
        assert_eq!(split_values("sst"), vec!["sst"]);
        assert_eq!(parse_dims("256/512"), Some([256, 512]));
        assert_eq!(parse_dims("256"), None);
        assert_eq!(parse_dims("256/x"), None);
    }

    #[test]
    fn option_names() {
        let matches = args_parser!("test")
            .arg(opt!("tile dims"))
            .arg(flag!("keep history"))
            .get_matches_from_safe(vec!["test", "--tile-dims", "4/4", "--keep-history"])
            .unwrap();
        assert_eq!(matches.value_of("tile dims"), Some("4/4"));
        assert!(matches.is_present("keep history"));
    }
}
