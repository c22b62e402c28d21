//! VisionQ client - submit a folder of images and poll for results.
//!
//! Usage: `visionq [image_folder]` (defaults to `images`). The backend URL
//! comes from `VISIONQ_URL`, and `LOOP` resubmits the folder N times for
//! quick load tests.

use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use visionq_common::{StartTaskResponse, TaskResultResponse, TaskState};

const DEFAULT_URL: &str = "http://localhost:8080";
const POLL_INITIAL: Duration = Duration::from_millis(250);
const POLL_MAX: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = env::var("VISIONQ_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let image_folder = env::args().nth(1).unwrap_or_else(|| "images".to_string());
    let loop_count: usize = env::var("LOOP")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let image_files = list_images(&image_folder)?;
    if image_files.is_empty() {
        println!("No images found in {image_folder}");
        return Ok(());
    }
    println!("Found {} image(s) to process.", image_files.len());

    let client = reqwest::Client::new();
    let mut task_ids = Vec::new();

    for _ in 0..loop_count {
        for path in &image_files {
            match start_task(&client, &base_url, path).await {
                Ok(task_id) => {
                    println!("Task started successfully. Task ID: {task_id}");
                    task_ids.push(task_id);
                }
                Err(e) => println!("Failed to start task for {}: {e}", path.display()),
            }
        }
    }

    for task_id in task_ids {
        poll_result(&client, &base_url, &task_id).await;
    }
    Ok(())
}

fn list_images(folder: &str) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn start_task(
    client: &reqwest::Client,
    base_url: &str,
    path: &Path,
) -> Result<String, Box<dyn Error>> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();

    let form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
    let response = client
        .post(format!("{base_url}/start_task"))
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    let parsed: StartTaskResponse = response.json().await?;
    Ok(parsed.task_id.to_string())
}

/// Poll with bounded exponential backoff until the task is terminal.
async fn poll_result(client: &reqwest::Client, base_url: &str, task_id: &str) {
    let mut delay = POLL_INITIAL;
    loop {
        let response = match client
            .get(format!("{base_url}/task_result/{task_id}"))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                println!("Failed to retrieve task result: {e}");
                return;
            }
        };

        let parsed: TaskResultResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("Failed to parse task result: {e}");
                return;
            }
        };

        match parsed.status {
            TaskState::Success => {
                let pretty = serde_json::to_string_pretty(&parsed).unwrap_or_default();
                println!("Task {task_id} completed. Here is the response:\n{pretty}");
                return;
            }
            TaskState::Failure => {
                let message = parsed
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                println!("Task {task_id} failed due to error: {message}");
                return;
            }
            TaskState::Pending | TaskState::Started => {
                println!("Task {task_id} still in progress...");
            }
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(POLL_MAX);
    }
}
