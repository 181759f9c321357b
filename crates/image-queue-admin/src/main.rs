use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use image_queue_client::GatewayClient;
use image_queue_core::{FilterSpec, TaskId, TaskPayload, TaskStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "iq-admin")]
#[command(about = "Image Queue Admin CLI", long_about = None)]
struct Args {
    /// Gateway address
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api: String,

    /// Session token for authenticated commands
    #[arg(long, env = "IQ_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output format (json, table)
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account
    Register { username: String, password: String },

    /// Log in and print a session token
    Login { username: String, password: String },

    /// Submit an image for filtering
    Submit {
        /// Filter name (Grayscale, Blur, Sharpen, Negative)
        filter: String,

        /// Filter parameters as a JSON object, e.g. '{"sigma": 2.0}'
        params: Option<String>,

        /// Image file
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Get task status
    Status { task_id: String },

    /// Fetch a task result
    Result {
        task_id: String,

        /// Write the decoded image here instead of printing base64
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Register a throwaway user, submit one image and wait for the result
    Shoot {
        filter: String,

        params: Option<String>,

        #[arg(short, long)]
        image: PathBuf,

        /// Where to write the filtered image
        #[arg(short, long, default_value = "result.png")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut client = GatewayClient::new(args.api.clone())?;
    if let Some(token) = &args.token {
        client = client.with_token(token.clone());
    }

    match args.command {
        Commands::Register { username, password } => {
            client.register(&username, &password).await?;
            println!("User {} registered", username);
        }

        Commands::Login { username, password } => {
            let token = client.login(&username, &password).await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::json!({ "token": token })),
                _ => println!("{}", token),
            }
        }

        Commands::Submit { filter, params, image } => {
            let payload = build_payload(&filter, params.as_deref(), &image)?;
            let task_id = client.submit_task(&payload).await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::json!({ "task_id": task_id })),
                _ => println!("Task submitted: {}", task_id),
            }
        }

        Commands::Status { task_id } => {
            let task_id = Uuid::parse_str(&task_id)?;
            let status = client.status(task_id).await?;
            match args.format.as_str() {
                "json" => {
                    println!("{}", serde_json::json!({ "task_id": task_id, "status": status }))
                }
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Field", "Value"]);
                    table.add_row(vec!["ID", &task_id.to_string()]);
                    table.add_row(vec!["Status", status.as_str()]);
                    println!("{table}");
                }
            }
        }

        Commands::Result { task_id, output } => {
            let task_id = Uuid::parse_str(&task_id)?;
            let result = client.result(task_id).await?;
            match output {
                Some(path) => {
                    write_image(&result, &path)?;
                    println!("Result written to {}", path.display());
                }
                None => println!("{}", result),
            }
        }

        Commands::Shoot { filter, params, image, output } => {
            let payload = build_payload(&filter, params.as_deref(), &image)?;
            shoot(&mut client, &payload, &output).await?;
        }
    }

    Ok(())
}

/// Read an image and wrap it with a filter spec
fn build_payload(filter: &str, params: Option<&str>, image: &Path) -> anyhow::Result<TaskPayload> {
    let mut spec = FilterSpec::new(filter);
    if let Some(params) = params {
        spec.parameters =
            serde_json::from_str(params).context("filter parameters must be a JSON object")?;
    }

    let bytes =
        std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    Ok(TaskPayload {
        filter: spec,
        image: STANDARD.encode(bytes),
    })
}

fn write_image(encoded: &str, path: &Path) -> anyhow::Result<()> {
    let bytes = STANDARD.decode(encoded).context("result is not an image")?;
    std::fs::write(path, bytes)?;
    Ok(())
}

async fn shoot(
    client: &mut GatewayClient,
    payload: &TaskPayload,
    output: &Path,
) -> anyhow::Result<()> {
    let username = format!("shoot-{}", Uuid::new_v4());
    let password = Uuid::new_v4().to_string();
    client.register(&username, &password).await?;
    client.login(&username, &password).await?;

    let task_id = client.submit_task(payload).await?;
    println!("Task submitted: {}", task_id);

    let status = wait_for_terminal(client, task_id).await?;
    let result = client.result(task_id).await?;
    match status {
        TaskStatus::Ready => {
            write_image(&result, output)?;
            println!("Result written to {}", output.display());
            Ok(())
        }
        _ => anyhow::bail!("task {} failed: {}", task_id, result),
    }
}

async fn wait_for_terminal(client: &GatewayClient, task_id: TaskId) -> anyhow::Result<TaskStatus> {
    loop {
        let status = client.status(task_id).await?;
        if status.is_terminal() {
            return Ok(status);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
