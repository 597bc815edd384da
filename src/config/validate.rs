// src/config/validate.rs

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::config::model::{BuildSection, ConfigFile, RawConfigFile, WatchSection};
use crate::errors::{DevwatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DevwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.root, raw.watch, raw.build))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_build_section(&cfg.build)?;
    validate_watch_section(&cfg.watch)?;
    Ok(())
}

fn validate_build_section(build: &BuildSection) -> Result<()> {
    if build.cmd.trim().is_empty() {
        return Err(DevwatchError::ConfigError(
            "[build].cmd must not be empty".to_string(),
        ));
    }

    if let Some(emit) = &build.emit_cmd {
        if emit.trim().is_empty() {
            return Err(DevwatchError::ConfigError(
                "[build].emit_cmd must not be empty when set".to_string(),
            ));
        }
    }

    compile_globs("[build].modules", &build.modules)?;

    if let Some(pattern) = &build.discover_on_stdout {
        compile_discover_regex(pattern)?;
    }

    Ok(())
}

fn validate_watch_section(watch: &WatchSection) -> Result<()> {
    if let Some(bad) = watch.extra.iter().find(|e| e.trim().is_empty()) {
        return Err(DevwatchError::ConfigError(format!(
            "[watch].extra contains an empty entry ({bad:?})"
        )));
    }
    compile_globs("[watch].ignored", &watch.ignored)?;
    Ok(())
}

/// Compile a list of glob patterns into a single `GlobSet`.
pub fn compile_globs(field: &str, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            DevwatchError::ConfigError(format!("{field}: invalid glob {pattern:?}: {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DevwatchError::ConfigError(format!("{field}: {e}")))
}

/// Compile `discover_on_stdout`, requiring a capture group for the path.
pub fn compile_discover_regex(pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern).map_err(|e| {
        DevwatchError::ConfigError(format!(
            "[build].discover_on_stdout: invalid regex {pattern:?}: {e}"
        ))
    })?;
    // captures_len() counts the implicit whole-match group.
    if re.captures_len() < 2 {
        return Err(DevwatchError::ConfigError(format!(
            "[build].discover_on_stdout: regex {pattern:?} needs a capture group for the path"
        )));
    }
    Ok(re)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).expect("valid TOML")
    }

    #[test]
    fn accepts_minimal_config() {
        let cfg = ConfigFile::try_from(raw("[build]\ncmd = \"make\"\n")).unwrap();
        assert_eq!(cfg.build.cmd, "make");
        assert!(cfg.watch.extra.is_empty());
        assert!(cfg.root.is_none());
    }

    #[test]
    fn rejects_empty_cmd() {
        let err = ConfigFile::try_from(raw("[build]\ncmd = \"  \"\n")).unwrap_err();
        assert!(matches!(err, DevwatchError::ConfigError(_)));
    }

    #[test]
    fn rejects_invalid_glob() {
        let err = ConfigFile::try_from(raw(
            "[watch]\nignored = [\"src/[\"]\n[build]\ncmd = \"make\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("[watch].ignored"));
    }

    #[test]
    fn discover_regex_needs_capture_group() {
        let err = ConfigFile::try_from(raw(
            "[build]\ncmd = \"make\"\ndiscover_on_stdout = \"^watch: .+$\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("capture group"));

        let ok = ConfigFile::try_from(raw(
            "[build]\ncmd = \"make\"\ndiscover_on_stdout = \"^watch: (.+)$\"\n",
        ));
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected_at_parse_time() {
        let parsed: std::result::Result<RawConfigFile, _> =
            toml::from_str("[build]\ncmd = \"make\"\nbogus = 1\n");
        assert!(parsed.is_err());
    }
}
