use wf_core::types::{Operation, ProjectId};
use wf_core::vfs::SnapshotPersistence;
use wf_core::VersionedFileStore;
use wf_db::SnapshotRepo;
use wf_db::schema::with_test_db;

fn db_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("forge.db").to_string_lossy().into_owned()
}

#[test]
fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let project = ProjectId::generate();

    {
        let repo = SnapshotRepo::open(&path, project.clone()).unwrap();
        let mut vfs = VersionedFileStore::open(repo).unwrap();
        vfs.apply(vec![Operation::create("index.html", "<h1>v1</h1>")], "first")
            .unwrap();
        vfs.apply(vec![Operation::update("index.html", "<h1>v2</h1>")], "second")
            .unwrap();
        vfs.undo().unwrap();
    }

    let repo = SnapshotRepo::open(&path, project).unwrap();
    let mut vfs = VersionedFileStore::open(repo).unwrap();
    assert_eq!(vfs.snapshots().len(), 3);
    assert_eq!(vfs.current().version, 1);
    assert_eq!(
        vfs.current().get("index.html").unwrap().content,
        "<h1>v1</h1>"
    );
    assert!(vfs.can_redo());

    vfs.redo().unwrap();
    assert_eq!(vfs.current().message, "second");
}

#[test]
fn new_edit_after_undo_drops_stored_redo_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let project = ProjectId::generate();

    {
        let repo = SnapshotRepo::open(&path, project.clone()).unwrap();
        let mut vfs = VersionedFileStore::open(repo).unwrap();
        vfs.apply(vec![Operation::create("a.css", "a")], "a").unwrap();
        vfs.apply(vec![Operation::create("b.css", "b")], "b").unwrap();
        vfs.apply(vec![Operation::create("c.css", "c")], "c").unwrap();
        vfs.undo().unwrap();
        vfs.undo().unwrap();
        vfs.apply(vec![Operation::create("d.css", "d")], "d").unwrap();
    }

    let repo = SnapshotRepo::open(&path, project).unwrap();
    let vfs = VersionedFileStore::open(repo).unwrap();
    let messages: Vec<&str> = vfs
        .snapshots()
        .iter()
        .map(|snapshot| snapshot.message.as_str())
        .collect();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1..], ["a", "d"]);
    assert_eq!(vfs.current().version, 2);
    assert!(!vfs.can_redo());
    assert!(vfs.current().get("b.css").is_none());
}

fn stored_message(path: &str, project: &ProjectId, version: u32) -> String {
    let conn = wf_db::schema::open(path).unwrap();
    conn.query_row(
        "SELECT message FROM snapshots WHERE project_id = ?1 AND version = ?2",
        rusqlite::params![project.as_str(), version],
        |row| row.get(0),
    )
    .unwrap()
}

fn mark_stored_rows(path: &str, project: &ProjectId) {
    let conn = wf_db::schema::open(path).unwrap();
    conn.execute(
        "UPDATE snapshots SET message = 'marked' WHERE project_id = ?1 AND version <= 2",
        [project.as_str()],
    )
    .unwrap();
}

#[test]
fn undo_and_redo_only_move_the_stored_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let project = ProjectId::generate();

    let repo = SnapshotRepo::open(&path, project.clone()).unwrap();
    let mut vfs = VersionedFileStore::open(repo).unwrap();
    vfs.apply(vec![Operation::create("a.css", "a")], "a").unwrap();
    vfs.apply(vec![Operation::create("b.css", "b")], "b").unwrap();
    mark_stored_rows(&path, &project);

    vfs.undo().unwrap();
    vfs.undo().unwrap();
    vfs.redo().unwrap();

    assert_eq!(stored_message(&path, &project, 1), "marked");
    assert_eq!(stored_message(&path, &project, 2), "marked");
    let reopened =
        VersionedFileStore::open(SnapshotRepo::open(&path, project).unwrap()).unwrap();
    assert_eq!(reopened.current().version, 1);
    assert_eq!(reopened.snapshots().len(), 3);
}

#[test]
fn apply_only_inserts_the_new_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let project = ProjectId::generate();

    let repo = SnapshotRepo::open(&path, project.clone()).unwrap();
    let mut vfs = VersionedFileStore::open(repo).unwrap();
    vfs.apply(vec![Operation::create("a.css", "a")], "a").unwrap();
    vfs.apply(vec![Operation::create("b.css", "b")], "b").unwrap();
    mark_stored_rows(&path, &project);

    vfs.apply(vec![Operation::create("c.css", "c")], "c").unwrap();

    assert_eq!(stored_message(&path, &project, 1), "marked");
    assert_eq!(stored_message(&path, &project, 2), "marked");
    assert_eq!(stored_message(&path, &project, 3), "c");
}

#[test]
fn projects_keep_separate_histories() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let first = ProjectId::generate();
    let second = ProjectId::generate();

    let mut vfs = VersionedFileStore::open(SnapshotRepo::open(&path, first).unwrap()).unwrap();
    vfs.apply(vec![Operation::create("index.html", "one")], "one")
        .unwrap();

    let other = SnapshotRepo::open(&path, second).unwrap();
    assert!(other.load().unwrap().is_none());
}

#[test]
fn unknown_project_starts_from_initial_snapshot() {
    let repo = SnapshotRepo::new(with_test_db().unwrap(), ProjectId::generate());
    let vfs = VersionedFileStore::open(repo).unwrap();

    assert_eq!(vfs.snapshots().len(), 1);
    assert_eq!(vfs.current().version, 0);
    assert!(!vfs.has_files());
}

#[test]
fn cursor_mismatch_is_reported_as_corrupt() {
    let conn = with_test_db().unwrap();
    let project = ProjectId::generate();
    conn.execute(
        "INSERT INTO history_cursor (project_id, current_index, len) VALUES (?1, 0, 2)",
        [project.as_str()],
    )
    .unwrap();
    let repo = SnapshotRepo::new(conn, project);

    let err = repo.load().unwrap_err();
    assert!(matches!(
        err,
        wf_core::error::VfsError::CorruptHistory { .. }
    ));
}
