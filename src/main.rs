// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use query_rs::ai::models::{ModelRegistry, ProviderKind};
use query_rs::ai::{GenerationOptions, PromptMode};
use query_rs::query::server;
use query_rs::query::{Config, QueryRequest};

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question
    Ask {
        /// The question to answer
        prompt: String,

        /// Model id, or "best"
        #[arg(short, long, default_value = "best")]
        model: String,

        /// Prompt mode: search, research or general
        #[arg(long, default_value = "search")]
        mode: String,

        /// Ground the answer in Google search results
        #[arg(long)]
        web: bool,

        /// Request a reasoning trace (NVIDIA models only)
        #[arg(long, conflicts_with = "web")]
        reasoning: bool,

        #[arg(short, long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// List available models
    Models,
    /// Check connectivity to every provider
    Check,
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;

    match args.command {
        Commands::Ask {
            prompt,
            model,
            mode,
            web,
            reasoning,
            temperature,
            max_tokens,
        } => {
            let mut options = GenerationOptions::default();
            if let Some(t) = temperature {
                options.temperature = t;
            }
            if let Some(n) = max_tokens {
                options.max_tokens = n;
            }
            let mode = PromptMode::parse(&mode);

            let state = server::AppState::from_config(&config)?;
            let service = state.service;

            if reasoning {
                let result = service
                    .dispatcher()
                    .generate_with_reasoning(&model, &prompt, &[], &options)
                    .await;
                if let Some(trace) = &result.reasoning {
                    println!("--- reasoning ---\n{}\n--- answer ---", trace);
                }
                print_result(result.success, result.content, result.error)?;
                return Ok(());
            }

            if web && service.search_backend().is_none() {
                bail!("--web needs GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_ENGINE_ID");
            }

            let request = QueryRequest {
                model,
                mode,
                web_search: web,
                options,
                ..QueryRequest::new(prompt)
            };
            let answer = service.answer(&request).await?;
            if let Some(model) = &answer.result.model_used {
                log::info!("Answered by {} ({})", model.display_name, model.provider_label);
            }
            let success = answer.result.success;
            print_result(success, answer.result.content, answer.result.error)?;

            if !answer.sources.is_empty() {
                println!("\nSources:");
                for (i, source) in answer.sources.iter().enumerate() {
                    println!("[{}] {} - {}", i + 1, source.title, source.link);
                }
            }
        }
        Commands::Models => {
            let registry = ModelRegistry::builtin();
            for kind in [ProviderKind::Auto]
                .into_iter()
                .chain(ProviderKind::BEST_PRIORITY)
            {
                for model in registry.list_by_provider(kind) {
                    println!(
                        "{:<18} {:<20} {:<11} {}",
                        model.id, model.display_name, model.provider_label, model.description
                    );
                }
            }
        }
        Commands::Check => {
            let dispatcher = config.build_dispatcher(Arc::new(ModelRegistry::default()))?;
            let results = dispatcher.test_connections().await;
            for (provider, ok) in &results {
                println!("{:<11} {}", provider, if *ok { "ok" } else { "FAILED" });
            }
            if results.values().all(|ok| !ok) {
                bail!("no provider is reachable");
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve(&config).await?;
        }
    }

    Ok(())
}

fn print_result(success: bool, content: Option<String>, error: Option<String>) -> anyhow::Result<()> {
    if !success {
        bail!(error.unwrap_or_else(|| "generation failed".to_string()));
    }
    println!("{}", content.unwrap_or_default());
    Ok(())
}
