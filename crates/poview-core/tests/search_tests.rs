//! Keyword search must not depend on which text index serves it.

use poview_core::{
    EntryRecord, EntryStore, FilterCriteria, QueryEngine, SearchField, StatusFilter,
};

fn sample_entries() -> Vec<EntryRecord> {
    let mut entries = vec![
        EntryRecord::new(None, "Open File", "Ouvrir le fichier"),
        EntryRecord::new(Some("menu"), "Open", "Ouvrir"),
        EntryRecord::new(None, "Catalog saved", "Catalogue enregistré"),
        EntryRecord::new(None, "Save as...", ""),
        EntryRecord::new(None, "100% done", "100 % terminé").with_flag("fuzzy"),
        EntryRecord::new(None, "snake_case name", "nom snake_case"),
    ];
    entries[3].tcomment = Some("Needs a FILE dialog".into());
    entries[3].references = vec!["src/dialogs/save.rs:42".into()];
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.position = i as i64;
    }
    entries
}

fn stores() -> (EntryStore, EntryStore) {
    let fts = EntryStore::new().unwrap();
    let scan = EntryStore::with_engine(QueryEngine::substring_only()).unwrap();
    fts.insert_bulk(&sample_entries()).unwrap();
    scan.insert_bulk(&sample_entries()).unwrap();
    (fts, scan)
}

fn assert_same(fts: &EntryStore, scan: &EntryStore, criteria: &FilterCriteria) {
    let a = fts.query_keys(criteria).unwrap();
    let b = scan.query_keys(criteria).unwrap();
    assert_eq!(a, b, "engines disagree for {:?}", criteria);
}

#[test]
fn test_engines_agree_on_keywords() {
    let (fts, scan) = stores();
    for keyword in [
        "open", "OPEN", "file", "ouvrir le", "cat", "atalog", "100%", "snake_case", "...", "zzz",
        "save as",
    ] {
        assert_same(&fts, &scan, &FilterCriteria::keyword_only(keyword));
    }
}

#[test]
fn test_engines_agree_on_scoped_search() {
    let (fts, scan) = stores();
    for field in SearchField::ALL {
        for keyword in ["file", "menu", "dialogs", "save"] {
            let criteria = FilterCriteria::builder()
                .keyword(keyword)
                .search_field(field)
                .build();
            assert_same(&fts, &scan, &criteria);
        }
    }
}

#[test]
fn test_engines_agree_with_predicates() {
    let (fts, scan) = stores();
    let criteria = FilterCriteria::builder()
        .keyword("done")
        .status(StatusFilter::Fuzzy)
        .build();
    assert_same(&fts, &scan, &criteria);
    assert_eq!(fts.query_keys(&criteria).unwrap(), vec!["|100% done"]);

    let criteria = FilterCriteria::builder()
        .keyword("save")
        .exclude_flag("fuzzy")
        .scope(SearchField::ALL)
        .build();
    assert_same(&fts, &scan, &criteria);
}

#[test]
fn test_substring_semantics() {
    let (fts, _scan) = stores();

    let keys = fts
        .query_keys(&FilterCriteria::keyword_only("file"))
        .unwrap();
    assert_eq!(keys, vec!["|Open File"]);

    let keys = fts
        .query_keys(
            &FilterCriteria::builder()
                .keyword("file")
                .scope([SearchField::Source, SearchField::Comments])
                .build(),
        )
        .unwrap();
    assert_eq!(keys, vec!["|Open File", "|Save as..."]);
}

#[test]
fn test_short_keyword_uses_scan_and_still_matches() {
    let (fts, scan) = stores();
    let criteria = FilterCriteria::keyword_only("le");

    assert_same(&fts, &scan, &criteria);
    assert_eq!(fts.query_keys(&criteria).unwrap(), vec!["|Open File"]);
}
