//! Journey: exporting an entity to its canvas file is write-through on the
//! first sync and on an unmodified file, but refuses to clobber a file a
//! human has since edited.

use mneme_core::extract::sha256_hex;
use mneme_core::storage::{Record, Storage};
use mneme_core::vault::{record_canvas_write, write_through, CanvasExporter, WriteDecision};
use mneme_e2e_tests::mocks::TestDataFactory;
use tempfile::tempdir;

struct MarkdownExporter;
impl CanvasExporter for MarkdownExporter {
    fn render(&self, entity: &Record) -> String {
        format!("# {}\n", entity.get("name").and_then(|v| v.as_str()).unwrap_or_default())
    }
}

fn entity_record(storage: &Storage, entity_id: i64) -> Record {
    storage.get_one("entities", "id = ?1", &[rusqlite::types::Value::Integer(entity_id)]).unwrap().unwrap()
}

#[test]
fn first_sync_writes_through_with_no_prior_hash() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let entity_id = TestDataFactory::create_entity(&storage, "Acme Corp", "organization");

    let decision = write_through(&storage, &MarkdownExporter, "acme-corp", &entity_record(&storage, entity_id), None).unwrap();

    assert_eq!(decision, WriteDecision::Write("# Acme Corp\n".to_string()));
}

#[test]
fn resyncing_an_untouched_export_writes_through_again() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let entity_id = TestDataFactory::create_entity(&storage, "Acme Corp", "organization");
    let rendered = "# Acme Corp\n";
    record_canvas_write(&storage, "acme-corp", rendered).unwrap();
    let on_disk_hash = sha256_hex(rendered.as_bytes());

    let decision =
        write_through(&storage, &MarkdownExporter, "acme-corp", &entity_record(&storage, entity_id), Some(&on_disk_hash)).unwrap();

    assert_eq!(decision, WriteDecision::Write(rendered.to_string()));
}

#[test]
fn a_human_edited_export_is_never_silently_overwritten() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let entity_id = TestDataFactory::create_entity(&storage, "Acme Corp", "organization");
    record_canvas_write(&storage, "acme-corp", "# Acme Corp\n").unwrap();

    let decision = write_through(
        &storage,
        &MarkdownExporter,
        "acme-corp",
        &entity_record(&storage, entity_id),
        Some(&sha256_hex(b"# Acme Corp\n\nedited by a human after export\n")),
    )
    .unwrap();

    assert_eq!(decision, WriteDecision::SkipUserEdited);
}
