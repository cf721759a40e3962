//! `.loxrc` loader: a line-oriented config read from the CWD at startup.
//! spec.md §6 pins exactly two directives, so this is a tiny line scanner
//! rather than a `toml`/`serde` document — dropped from this crate's
//! dependency list versus the teacher's `vitte-cli`, which parses a real
//! TOML project manifest (see DESIGN.md).

use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub trace: bool,
    pub show_bytecode: bool,
}

impl Config {
    /// Reads `.loxrc` from `dir` if it exists; unknown lines are ignored
    /// rather than rejected, matching the REPL's general tolerance for
    /// unrecognized `:` commands.
    pub fn load_from(dir: &Path) -> Config {
        let mut config = Config::default();
        let path = dir.join(".loxrc");
        let Ok(contents) = fs::read_to_string(&path) else {
            return config;
        };
        for line in contents.lines() {
            match line.trim() {
                ":enable-tracing" => config.trace = true,
                ":show-bytecode" => config.show_bytecode = true,
                "" => {}
                other => log::debug!("ignoring unrecognized .loxrc directive: {other}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = std::env::temp_dir().join("loxide_cli_test_missing");
        let _ = fs::create_dir_all(&dir);
        let config = Config::load_from(&dir);
        assert!(!config.trace);
        assert!(!config.show_bytecode);
    }

    #[test]
    fn recognized_directives_are_applied() {
        let dir = std::env::temp_dir().join("loxide_cli_test_present");
        fs::create_dir_all(&dir).unwrap();
        let mut f = fs::File::create(dir.join(".loxrc")).unwrap();
        writeln!(f, ":enable-tracing").unwrap();
        writeln!(f, ":show-bytecode").unwrap();
        writeln!(f, ":unknown-directive").unwrap();
        let config = Config::load_from(&dir);
        assert!(config.trace);
        assert!(config.show_bytecode);
        let _ = fs::remove_file(dir.join(".loxrc"));
    }
}
