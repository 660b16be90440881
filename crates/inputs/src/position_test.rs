use super::{PositionEntry, PositionFile};

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let pf = PositionFile::load(dir.path().join("pos")).unwrap();
    assert!(pf.is_empty());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pos");

    let mut pf = PositionFile::load(&path).unwrap();
    pf.set(
        "/var/log/a.log",
        PositionEntry {
            inode: 42,
            offset: 1234,
        },
    );
    pf.set(
        "/var/log/b.log",
        PositionEntry {
            inode: 7,
            offset: 0,
        },
    );
    pf.save().unwrap();

    let reloaded = PositionFile::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(
        reloaded.get("/var/log/a.log"),
        Some(PositionEntry {
            inode: 42,
            offset: 1234
        })
    );
    assert_eq!(
        reloaded.get("/var/log/b.log"),
        Some(PositionEntry {
            inode: 7,
            offset: 0
        })
    );
}

#[test]
fn save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pos");

    let mut pf = PositionFile::load(&path).unwrap();
    pf.set("x", PositionEntry { inode: 1, offset: 2 });
    pf.save().unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["pos".to_string()]);
}

#[test]
fn updates_replace_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pos");

    let mut pf = PositionFile::load(&path).unwrap();
    pf.set("f", PositionEntry { inode: 1, offset: 10 });
    pf.set("f", PositionEntry { inode: 1, offset: 20 });
    pf.save().unwrap();

    let reloaded = PositionFile::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(
        reloaded.get("f"),
        Some(PositionEntry { inode: 1, offset: 20 })
    );
}

#[test]
fn garbage_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pos");
    std::fs::write(&path, "good\t5\t6\nbad line\nworse\tx\ty\n").unwrap();

    let pf = PositionFile::load(&path).unwrap();
    assert_eq!(pf.len(), 1);
    assert_eq!(pf.get("good"), Some(PositionEntry { inode: 5, offset: 6 }));
}
