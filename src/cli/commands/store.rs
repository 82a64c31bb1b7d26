//! CLI command for `milenv store`

use anyhow::Result;

use crate::cli::output::{is_json, print_json, print_success};
use crate::infra::dirs::MilenvDirs;
use crate::infra::store::Store;

fn open() -> Store {
    Store::new(MilenvDirs::new().store_dir())
}

/// Execute store info subcommand
pub async fn execute_info() -> Result<()> {
    let store = open();
    let usage = store.usage();

    if is_json() {
        return print_json(&serde_json::json!({
            "path": store.root(),
            "entries": usage.entries,
            "files": usage.files,
            "size_bytes": usage.size_bytes,
        }));
    }

    println!("Location: {}", store.root().display());
    println!("Entries: {}", usage.entries);
    println!("Files: {}", usage.files);
    println!("Size: {}", usage.format_size());
    Ok(())
}

/// Execute store clean subcommand
pub async fn execute_clean() -> Result<()> {
    let store = open();
    let usage = store.usage();
    store.clean()?;

    if is_json() {
        return print_json(&serde_json::json!({
            "removed_entries": usage.entries,
            "freed_bytes": usage.size_bytes,
        }));
    }
    if usage.entries == 0 {
        print_success("Store was already empty");
    } else {
        print_success(&format!(
            "Removed {} entries ({} freed)",
            usage.entries,
            usage.format_size()
        ));
    }
    Ok(())
}
