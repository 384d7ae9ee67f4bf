use anyhow::Context;
use clap::Parser;
use jtproject::config::cli::{Command, SubmitArgs};
use jtproject::core::ConfigProvider;
use jtproject::utils::{logger, validation::Validate};
use jtproject::{CliConfig, HttpProjectStore, Project, ProjectGateway, TomlConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let file_config = match &cli.config {
        Some(path) => Some(
            TomlConfig::from_file(path)
                .with_context(|| format!("reading configuration {}", path.display()))?,
        ),
        None => None,
    };

    match &file_config {
        Some(config) if config.json_logging() => logger::init_json_logger(config.log_level()),
        _ => logger::init_cli_logger(cli.verbose),
    }
    tracing::debug!("CLI config: {:?}", cli);

    let validation = match &file_config {
        Some(config) => config.validate(),
        None => cli.validate(),
    };
    if let Err(e) = validation {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    let (store, ordered) = match &file_config {
        Some(config) => (HttpProjectStore::from_config(config)?, config.ordered_submissions()),
        None => (HttpProjectStore::from_config(&cli)?, cli.ordered_submissions()),
    };
    let gateway = ProjectGateway::new(store).with_ordered_submissions(ordered);

    if let Err(e) = run(&gateway, &cli.command).await {
        tracing::error!("❌ {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(gateway: &ProjectGateway<HttpProjectStore>, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Fetch {
            experiment,
            pipeline,
            output,
        } => {
            let project = gateway.fetch_project(experiment, pipeline).await?;
            let document = project.to_yaml()?;
            match output {
                Some(path) => {
                    std::fs::write(path, document)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("📁 Project saved to: {}", path.display());
                }
                None => print!("{}", document),
            }
        }
        Command::Save(args) => {
            let project = load_edited(args)?;
            let payload = gateway.save_project(&project).await?;
            println!("✅ Saved project '{}'", project.name);
            print_payload(&payload)?;
        }
        Command::Check(args) => {
            let project = load_edited(args)?;
            let payload = gateway.check_project(&project).await?;
            println!("✅ Project '{}' passed the check", project.name);
            print_payload(&payload)?;
        }
        Command::Joblist(args) => {
            let project = load_edited(args)?;
            let payload = gateway.create_joblist(&project).await?;
            println!("✅ Created joblist for '{}'", project.name);
            print_payload(&payload)?;
        }
        Command::Channels { experiment } => {
            for channel in gateway.fetch_available_channels(experiment).await? {
                println!("{}", channel.name);
            }
        }
        Command::Figure {
            experiment,
            pipeline,
            module,
            job,
        } => {
            let figure = gateway
                .fetch_module_figure(experiment, pipeline, module, *job)
                .await?;
            print_payload(&figure.0)?;
        }
    }
    Ok(())
}

/// Loads a project document and applies `--set` edits as raw UI text.
fn load_edited(args: &SubmitArgs) -> anyhow::Result<Project> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let mut project = Project::from_yaml(args.experiment.clone(), &content)?;
    if let Some(pipeline) = &args.pipeline {
        project.name = pipeline.clone();
    }

    for edit in &args.edits {
        tracing::debug!("{}.{} = {:?}", edit.module, edit.parameter, edit.raw);
        project.set_raw(&edit.module, &edit.parameter, Some(edit.raw.clone()))?;
    }
    Ok(project)
}

fn print_payload(payload: &serde_json::Value) -> anyhow::Result<()> {
    if !payload.is_null() {
        println!("{}", serde_json::to_string_pretty(payload)?);
    }
    Ok(())
}
