use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use llamagate_core_sdk::{
    config::GatewayConfig,
    db, discovery,
    models::{ChatMessage, Role},
    registry::{ModelRegistry, SqliteRegistry},
    server, telemetry,
};

/**
 * \brief CLI 程序入口：启动网关或执行一次性查询。
 */
#[derive(Parser, Debug)]
#[command(name = "llamagate", version, about = "OpenAI/Ollama compatible model gateway")]
struct Cli {
    /** \brief 注册表数据库路径，默认取 DATABASE_PATH */
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /** \brief 省略时等同于 `serve` */
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 发现模型并启动 HTTP 服务。
     */
    Serve {
        /** \brief 监听地址，默认 0.0.0.0:$PORT */
        #[arg(long)]
        addr: Option<String>,
    },

    /**
     * \brief 发现模型并打印注册表内容。
     */
    Models,

    /**
     * \brief 通过网关翻译路径发送一条消息并打印回复。
     */
    Chat {
        #[arg(long)]
        model: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        system: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env 缺失不是错误
    let _ = dotenvy::dotenv();
    let config = GatewayConfig::from_env();
    telemetry::init(&config.log_level)?;

    let db_path = cli.database.unwrap_or_else(|| config.database_path.clone());
    let conn = db::open_db(&db_path)
        .with_context(|| format!("open database {} failed", db_path.display()))?;
    db::migrate(&conn).context("apply migrations failed")?;
    let registry = Arc::new(SqliteRegistry::new(conn));

    let pool = discovery::discover(&registry, &config)
        .await
        .context("model discovery failed")?;
    tracing::info!(adapters = pool.len(), "discovery finished");

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.addr());
            let dispatcher = Arc::new(discovery::build_dispatcher(registry, pool));
            server::run(&addr, dispatcher).await?;
        }
        Commands::Models => {
            for provider in registry.active_providers().context("load providers failed")? {
                for model in registry
                    .models_of(provider.id)
                    .context("load models failed")?
                    .into_iter()
                    .filter(|m| m.active)
                {
                    println!("{:<10} {:<40} {}", provider.name, model.model_id, model.name);
                }
            }
        }
        Commands::Chat {
            model,
            prompt,
            system,
        } => {
            let dispatcher = discovery::build_dispatcher(registry, pool);
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::new(Role::System, system));
            }
            messages.push(ChatMessage::new(Role::User, prompt));

            let result = dispatcher
                .chat(&model, &messages)
                .await
                .context("chat failed")?;
            if !result.completed {
                tracing::warn!(model = %result.model_id, "reply was not marked complete");
            }
            println!("{}", result.text);
        }
    }

    Ok(())
}
