//! Record retrieval over HTTP into a temporary file.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::io;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

/// Default location of the full study-record download.
pub const DOWNLOAD_URL: &str = "https://clinicaltrials.gov/api/bulk/studies.xml.gz";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Download the record archive to a temp file. The file is deleted when the
/// returned handle is dropped, so keep it alive while reading. Downloads can
/// run long, so no request timeout is set.
pub fn download_records(url: &str) -> Result<NamedTempFile, FetchError> {
    info!(url, "downloading records");
    let client = Client::builder().timeout(None).build()?;
    let response = client.get(url).send()?.error_for_status()?;

    let pb = match response.content_length() {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut file = NamedTempFile::new()?;
    let mut reader = response;
    io::copy(&mut reader, &mut pb.wrap_write(file.as_file_mut()))?;
    pb.finish_and_clear();
    info!(path = %file.path().display(), "download complete");
    Ok(file)
}
