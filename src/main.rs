use clap::{Parser, Subcommand};
use ullama::config::{normalize_ollama_host, Config};
use ullama::{logging, server, ui};

#[derive(Parser)]
#[command(name = "ullama")]
#[command(version)]
#[command(about = "Chat with local Ollama models from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat UI (the default)
    Chat {
        /// Base URL of the ullama proxy
        #[arg(long)]
        proxy_url: Option<String>,
        /// Model for new conversations
        #[arg(long)]
        model: Option<String>,
    },
    /// Run the proxy in front of Ollama
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Base URL of the Ollama runtime
        #[arg(long)]
        ollama_url: Option<String>,
    },
    /// List the suggested models
    Models,
}

fn list_models(config: &Config) {
    if config.client.models.is_empty() {
        println!("No suggested models configured. Any installed model can be used with /model <name>.");
        return;
    }

    println!("Suggested models:\n");
    for choice in &config.client.models {
        let marker = if choice.id == config.client.default_model {
            "*"
        } else {
            " "
        };
        println!(" {} {:<12} {}", marker, choice.label, choice.id);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        None => {
            logging::init_tui_logging()?;
            ui::run(config).await
        }
        Some(Commands::Chat { proxy_url, model }) => {
            if let Some(url) = proxy_url {
                config.client.proxy_url = url;
            }
            if let Some(model) = model {
                config.client.default_model = model;
            }
            logging::init_tui_logging()?;
            ui::run(config).await
        }
        Some(Commands::Serve { bind, ollama_url }) => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(url) = ollama_url {
                config.ollama.base_url = normalize_ollama_host(&url);
            }
            logging::init_server_logging();
            server::run(config).await
        }
        Some(Commands::Models) => {
            list_models(&config);
            Ok(())
        }
    }
}
