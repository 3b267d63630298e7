use anyhow::Result;
use resumable_upload::helper;
use resumable_upload::upload::RetryBudget;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = env::args().collect::<Vec<_>>();

    match args.as_slice() {
        [_, path, auth_token] => upload(path, auth_token).await,
        _ => panic!(
            "\n\nPlease input [the_path_to_the_video] and [oauth_access_token(ya29.a0......)]\n\n"
        ),
    }
}

async fn upload(path: &str, auth_token: &str) -> Result<()> {
    let title = Path::new(path)
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_owned();
    let metadata = serde_json::json!({
        "snippet": { "title": title },
        "status": { "privacyStatus": "private" },
    });

    let body = helper::upload(
        path,
        &metadata,
        auth_token,
        RetryBudget::new(10),
        None,
        None,
        Some(Arc::new(Mutex::new(|end: u64, total: u64| {
            println!("uploaded: {}/{}", end + 1, total);
        }))),
    )
    .await?;

    println!("result: {}", body);

    Ok(())
}
