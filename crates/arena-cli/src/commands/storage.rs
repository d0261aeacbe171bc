//! `arena objects`.

use std::path::Path;

use anyhow::Result;

use super::connect_storage;

pub async fn objects(config: &Path, bucket: &str, prefix: &str) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;
    let objects = storage.list_objects(bucket, prefix).await;

    for object in &objects {
        println!(
            "{}  {:>14}  {}",
            object.last_modified.format("%Y-%m-%d %H:%M:%S"),
            object.size,
            object.key
        );
    }
    eprintln!(
        "{} objects in {bucket} via {} ({})",
        objects.len(),
        storage.endpoint(),
        storage.region()
    );
    Ok(())
}
