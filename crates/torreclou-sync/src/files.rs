//! Local file enumeration shared with the Upload Stage's exclusion filter
//! (§4.9 step 3 "same exclusion filter as §4.8 step 5").

fn is_engine_local_artifact(file_name: &str) -> bool {
    file_name.ends_with(".fresume") || file_name.ends_with(".dht") || file_name == "dht_nodes.cache" || file_name == "fastresume"
}

pub struct LocalFile {
    pub relative_path: String,
    pub absolute_path: String,
    pub size: i64,
}

pub async fn enumerate_files(root: &str) -> Result<Vec<LocalFile>, std::io::Error> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                stack.push(path.to_string_lossy().to_string());
                continue;
            }

            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if is_engine_local_artifact(&file_name) {
                continue;
            }

            let relative_path = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            out.push(LocalFile { relative_path, absolute_path: path.to_string_lossy().to_string(), size: metadata.len() as i64 });
        }
    }

    out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(out)
}

/// Forward-slash normalized S3 key for a file under `s3_key_prefix`
/// (§4.9 step 4).
pub fn s3_key(s3_key_prefix: &str, relative_path: &str) -> String {
    format!("{}/{}", s3_key_prefix.trim_end_matches('/'), relative_path.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_key_joins_prefix_and_relative_path() {
        assert_eq!(s3_key("torrents/1", "sub/file.txt"), "torrents/1/sub/file.txt");
        assert_eq!(s3_key("torrents/1/", "file.txt"), "torrents/1/file.txt");
    }
}
