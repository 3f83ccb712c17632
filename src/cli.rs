//! Helpers shared by the accompanying binaries: argument
//! macros, progress bars and logging setup.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{path::Path, str::FromStr};

use anyhow::{anyhow, Result};
pub use clap::{App, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use tracing_subscriber::EnvFilter;

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Send `tracing` events to stderr. `RUST_LOG` wins over
/// `verbosity` (0 = warn, 1 = info, 2 = debug, more = trace).
pub fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// Parse an optional argument value with `FromStr`.
pub fn parse_value<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| anyhow!("invalid value `{}` for --{}: {}", v, name.to_kebab_case(), e))
        })
        .transpose()
}

pub fn path_value<'a>(matches: &'a ArgMatches, name: &str) -> Option<&'a Path> {
    matches.value_of(name).map(Path::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> Result<ArgMatches<'static>> {
        Ok(args_parser!("test")
            .arg(opt!("kernel_size").takes_value(true))
            .arg(opt!("out_dir").takes_value(true))
            .get_matches_from_safe(args)?)
    }

    #[test]
    fn options_use_kebab_case() -> Result<()> {
        let m = matches(&["test", "--kernel-size", "7", "--out-dir", "x"])?;
        assert_eq!(parse_value::<usize>(&m, "kernel_size")?, Some(7));
        assert_eq!(path_value(&m, "out_dir"), Some(Path::new("x")));
        Ok(())
    }

    #[test]
    fn bad_values_are_reported() -> Result<()> {
        let m = matches(&["test", "--kernel-size", "big"])?;
        let err = parse_value::<usize>(&m, "kernel_size").unwrap_err();
        assert!(err.to_string().contains("--kernel-size"));
        assert_eq!(parse_value::<usize>(&m, "out_dir")?, None);
        Ok(())
    }
}
