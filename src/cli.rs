use crate::config::CatalogConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    undo_capacity: Option<usize>,
    publish_budget: Option<usize>,
    watch: Option<bool>,
    targets: Vec<PathBuf>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_arg) = iter.next() {
            let arg = raw_arg.as_ref();
            let Some(key) = arg.strip_prefix("--") else {
                overrides.targets.push(PathBuf::from(arg));
                continue;
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{arg}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "undo-capacity" => {
                    let capacity = value
                        .parse::<usize>()
                        .with_context(|| format!("Invalid undo capacity '{value}'"))?;
                    if capacity == 0 {
                        bail!("Undo capacity must be at least 1");
                    }
                    overrides.undo_capacity = Some(capacity);
                }
                "publish-budget" => {
                    let budget = value
                        .parse::<usize>()
                        .with_context(|| format!("Invalid publish budget '{value}'"))?;
                    if budget == 0 {
                        bail!("Publish budget must be at least 1");
                    }
                    overrides.publish_budget = Some(budget);
                }
                "watch" => overrides.watch = Some(parse_bool_flag("watch", &value)?),
                _ => bail!(
                    "Unknown flag '{arg}'. Supported flags: --config, --undo-capacity, --publish-budget, --watch."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn config_overrides(&self) -> CatalogConfigOverrides {
        CatalogConfigOverrides {
            undo_capacity: self.undo_capacity,
            publish_budget: self.publish_budget,
            watch: self.watch,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}
