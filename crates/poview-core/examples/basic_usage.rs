//! Basic usage example - load a few entries, filter them, edit one

use poview_core::{CacheConfig, EntryRecord, EntryViewer, FilterCriteria, Result, StatusFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Keyword from args or a default
    let keyword = std::env::args().nth(1).unwrap_or_else(|| "file".to_string());

    let viewer = EntryViewer::new(CacheConfig::default())?;
    viewer.load_entries(&[
        EntryRecord::new(None, "Open File", "Ouvrir le fichier").with_position(0),
        EntryRecord::new(Some("menu"), "File", "").with_position(1),
        EntryRecord::new(None, "Save File", "Enregistrer").with_position(2),
        EntryRecord::new(None, "Quit", "Quitter").with_position(3).with_flag("fuzzy"),
    ])?;

    println!("Searching for '{}'...", keyword);
    let criteria = FilterCriteria::keyword_only(keyword.as_str());
    let matches = viewer.get_filtered(&criteria)?;

    if matches.is_empty() {
        println!("No entries found.");
    } else {
        println!("Found {} entries:", matches.len());
        for entry in &matches {
            println!("  - {:?} -> {:?} ({:?})", entry.msgid, entry.msgstr, entry.status());
        }
    }

    // Prefetch the untranslated ones, then fill one in
    let untranslated = FilterCriteria::builder()
        .status(StatusFilter::Untranslated)
        .build();
    let keys = viewer.store().query_keys(&untranslated)?;
    if let Some(handle) = viewer.prefetch(keys.clone()) {
        let outcome = handle.join().await;
        println!("Prefetched {} of {} entries", outcome.inserted, outcome.requested);
    }

    if let Some(key) = keys.first() {
        if let Some(entry) = viewer.get_entry(key)? {
            let mut entry = EntryRecord::clone(&entry);
            entry.msgstr = "Fichier".to_string();
            viewer.update_entry(&entry)?;
        }
    }

    let stats = viewer.statistics()?;
    println!(
        "{} of {} translated ({:.0}%), modified: {}",
        stats.translated,
        stats.total,
        stats.progress,
        viewer.is_modified()
    );
    println!("Cache: {:?}", viewer.cache_stats());

    Ok(())
}
