// SPDX-License-Identifier: CEPL-1.0
mod clear;
mod triangle;

use anyhow::{bail, Context, Result};
use prism_core::TechniqueConfig;
use prism_render_vk::Technique;
use serde::de::DeserializeOwned;

pub use clear::ClearTechnique;
pub use triangle::TriangleTechnique;

pub const AVAILABLE: [&str; 2] = ["clear", "triangle"];

pub fn build(config: &TechniqueConfig) -> Result<Box<dyn Technique>> {
    let technique: Box<dyn Technique> = match config.name.as_str() {
        "clear" => Box::new(ClearTechnique::new(params(config)?)),
        "triangle" => Box::new(TriangleTechnique::new(params(config)?)),
        other => bail!("unknown technique '{other}' (available: {})", AVAILABLE.join(", ")),
    };
    Ok(technique)
}

/// Deserializes the free-form `[technique]` keys into a technique's parameters.
fn params<T: DeserializeOwned>(config: &TechniqueConfig) -> Result<T> {
    toml::Value::Table(config.params.clone())
        .try_into()
        .with_context(|| format!("parameters for technique '{}'", config.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> TechniqueConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn builds_known_techniques() {
        assert_eq!(build(&config("name = \"clear\"")).unwrap().name(), "clear");
        assert_eq!(build(&config("name = \"triangle\"")).unwrap().name(), "triangle");
    }

    #[test]
    fn unknown_name_lists_choices() {
        let err = build(&config("name = \"teapot\"")).err().unwrap();
        assert!(err.to_string().contains("clear, triangle"));
    }

    #[test]
    fn bad_parameters_are_reported() {
        let err = build(&config("name = \"clear\"\ncolor = \"red\""))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("technique 'clear'"));
    }
}
