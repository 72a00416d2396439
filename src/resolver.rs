//! `zibravdb://` asset-URL parsing for the resolver collaborator.

use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

/// URL scheme addressing frames inside a compressed sequence file.
pub const URL_SCHEME: &str = "zibravdb";

/// Parsed `zibravdb://<filepath>?frame=<int>&...` reference.
///
/// Query parameters other than `frame` are opaque and passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAssetUrl {
    pub path: PathBuf,
    pub frame: i32,
    pub extra: Vec<(String, String)>,
}

pub fn parse_volume_url(input: &str) -> PipelineResult<VolumeAssetUrl> {
    let rest = input
        .strip_prefix(URL_SCHEME)
        .and_then(|s| s.strip_prefix("://"))
        .ok_or_else(|| {
            PipelineError::InvalidInput(format!("expected {}:// URL, got '{}'", URL_SCHEME, input))
        })?;

    let (path_part, query) = rest.split_once('?').unwrap_or((rest, ""));
    if path_part.is_empty() {
        return Err(PipelineError::InvalidInput(format!("URL '{}' has no file path", input)));
    }

    let mut frame = 0;
    let mut extra = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == "frame" {
            frame = value.parse::<i32>().map_err(|_| {
                PipelineError::InvalidInput(format!("bad frame index '{}' in '{}'", value, input))
            })?;
        } else {
            extra.push((key.into_owned(), value.into_owned()));
        }
    }

    Ok(VolumeAssetUrl { path: PathBuf::from(path_part), frame, extra })
}
