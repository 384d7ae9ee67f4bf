use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, validate_url, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Parser)]
#[command(name = "jtproject")]
#[command(about = "Fetch, edit and submit image analysis pipeline projects")]
pub struct CliConfig {
    #[arg(long, default_value = "http://localhost:5002")]
    pub base_url: String,

    #[arg(long, help = "Read store and logging settings from a TOML file")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    #[arg(long = "header", value_parser = parse_header, help = "Extra request header as NAME=VALUE")]
    pub headers: Vec<(String, String)>,

    #[arg(long, help = "Send submissions one at a time, in order")]
    pub ordered: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Download a project and print it as YAML
    Fetch {
        #[arg(long)]
        experiment: String,
        #[arg(long)]
        pipeline: String,
        #[arg(long, help = "Write the YAML to this file instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Save a project document
    Save(SubmitArgs),
    /// Validate a project document without saving it
    Check(SubmitArgs),
    /// Create the job list of a saved project
    Joblist(SubmitArgs),
    /// List the channels an experiment offers as input
    Channels {
        #[arg(long)]
        experiment: String,
    },
    /// Print the figure a module produced for one job
    Figure {
        #[arg(long)]
        experiment: String,
        #[arg(long)]
        pipeline: String,
        #[arg(long)]
        module: String,
        #[arg(long)]
        job: u64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub experiment: String,

    #[arg(long, help = "YAML project document")]
    pub file: PathBuf,

    #[arg(long, help = "Pipeline name, defaults to the document's name")]
    pub pipeline: Option<String>,

    #[arg(long = "set", help = "Edit a parameter as MODULE.PARAMETER=TEXT")]
    pub edits: Vec<ParameterEdit>,
}

/// A parameter edit given as text, the way a form control would deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEdit {
    pub module: String,
    pub parameter: String,
    pub raw: String,
}

impl FromStr for ParameterEdit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (target, raw) = s
            .split_once('=')
            .ok_or_else(|| format!("expected MODULE.PARAMETER=TEXT, got '{}'", s))?;
        let (module, parameter) = target
            .rsplit_once('.')
            .ok_or_else(|| format!("expected MODULE.PARAMETER before '=', got '{}'", target))?;
        if module.is_empty() || parameter.is_empty() {
            return Err(format!("module and parameter must be named in '{}'", target));
        }

        Ok(Self {
            module: module.to_string(),
            parameter: parameter.to_string(),
            raw: raw.to_string(),
        })
    }
}

fn parse_header(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

impl ConfigProvider for CliConfig {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_seconds(&self) -> Option<u64> {
        self.timeout_seconds
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }

    fn ordered_submissions(&self) -> bool {
        self.ordered
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("base_url", &self.base_url)?;
        if let Some(timeout) = self.timeout_seconds {
            validate_positive_number("timeout_seconds", timeout, 1)?;
        }
        for (name, _) in &self.headers {
            validate_non_empty_string("header", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameter_edit() {
        let edit: ParameterEdit = "smooth.filter_size=7".parse().unwrap();
        assert_eq!(edit.module, "smooth");
        assert_eq!(edit.parameter, "filter_size");
        assert_eq!(edit.raw, "7");

        let edit: ParameterEdit = "v2.threshold.channels=DAPI,GFP".parse().unwrap();
        assert_eq!(edit.module, "v2.threshold");
        assert_eq!(edit.raw, "DAPI,GFP");

        let cleared: ParameterEdit = "smooth.label=".parse().unwrap();
        assert_eq!(cleared.raw, "");

        assert!("smooth=7".parse::<ParameterEdit>().is_err());
        assert!("smooth.filter_size".parse::<ParameterEdit>().is_err());
    }

    #[test]
    fn test_parse_command_line() {
        let config = CliConfig::try_parse_from([
            "jtproject",
            "--base-url",
            "https://tissuemaps.example.org",
            "--header",
            "Authorization=Bearer abc",
            "save",
            "--experiment",
            "exp-1",
            "--file",
            "project.yaml",
            "--set",
            "smooth.filter_size=7",
        ])
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.headers(),
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        match config.command {
            Command::Save(args) => {
                assert_eq!(args.experiment, "exp-1");
                assert_eq!(args.edits.len(), 1);
                assert_eq!(args.pipeline, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let config = CliConfig::try_parse_from([
            "jtproject",
            "--base-url",
            "localhost",
            "channels",
            "--experiment",
            "exp-1",
        ])
        .unwrap();

        assert!(config.validate().is_err());
    }
}
