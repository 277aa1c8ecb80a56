use ext4_snapback::error::RecoveryError;
use ext4_snapback::io::ImageReader;
use ext4_snapback::metadata::{BlockGroup, FilesystemMetadata, GroupFlags};
use ext4_snapback::snapshot::{self, FileEntry, Snapshot};
use ext4_snapback::types::Chunk;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use tempfile::{NamedTempFile, tempdir};

const BS: u32 = 512;
const INODE_SIZE: usize = 128;

const INODE_BITMAP_BLOCK: u64 = 1;
const BLOCK_BITMAP_BLOCK: u64 = 2;
const INODE_TABLE_BLOCK: u64 = 3;
const ROOT_DIR_BLOCK: u64 = 8;
const FILE_DATA_BLOCK: u64 = 9;

const FILE_CONTENT: &[u8] = b"hello recovered file";

fn meta() -> FilesystemMetadata {
    FilesystemMetadata {
        block_size: BS,
        inode_size: INODE_SIZE as u16,
        inodes_count: 16,
        blocks_count: 64,
        blocks_per_group: 64,
        inodes_per_group: 16,
        filetype_feature: true,
        groups: vec![BlockGroup {
            group: 0,
            block_bitmap: BLOCK_BITMAP_BLOCK,
            inode_bitmap: INODE_BITMAP_BLOCK,
            inode_table: INODE_TABLE_BLOCK,
            flags: GroupFlags::default(),
        }],
    }
}

/// Raw inode record with an embedded single-leaf extent root.
fn raw_inode(mode: u16, size: u32, data_block: u64) -> Vec<u8> {
    let mut data = vec![0u8; INODE_SIZE];
    data[0x00..0x02].copy_from_slice(&mode.to_le_bytes());
    data[0x04..0x08].copy_from_slice(&size.to_le_bytes());
    data[0x1A..0x1C].copy_from_slice(&1u16.to_le_bytes());
    data[0x20..0x24].copy_from_slice(&0x8_0000u32.to_le_bytes()); // extents

    // Extent root: header + one leaf covering logical block 0.
    let region = 0x28;
    data[region..region + 2].copy_from_slice(&0xF30Au16.to_le_bytes());
    data[region + 2..region + 4].copy_from_slice(&1u16.to_le_bytes());
    data[region + 4..region + 6].copy_from_slice(&4u16.to_le_bytes());
    // depth 0, generation 0 already zeroed
    let leaf = region + 12;
    data[leaf..leaf + 4].copy_from_slice(&0u32.to_le_bytes());
    data[leaf + 4..leaf + 6].copy_from_slice(&1u16.to_le_bytes());
    data[leaf + 8..leaf + 12].copy_from_slice(&(data_block as u32).to_le_bytes());

    data
}

fn dir_block(entries: &[(u32, u8, &str)]) -> Vec<u8> {
    let mut data = Vec::new();
    for (i, (inode, ftype, name)) in entries.iter().enumerate() {
        let name = name.as_bytes();
        let rec_len = if i == entries.len() - 1 {
            BS as usize - data.len()
        } else {
            (8 + name.len() + 3) & !3
        };
        data.extend_from_slice(&inode.to_le_bytes());
        data.extend_from_slice(&(rec_len as u16).to_le_bytes());
        data.push(name.len() as u8);
        data.push(*ftype);
        data.extend_from_slice(name);
        data.resize(data.len() + rec_len - 8 - name.len(), 0);
    }
    data
}

/// A one-group image with a root directory (inode 2) holding one regular
/// file `hello.txt` (inode 12). `file_deleted` clears the file's
/// inode-bitmap bit; `data_reused` marks its data block live again.
fn build_image(file_deleted: bool, data_reused: bool) -> Vec<u8> {
    let mut image = vec![0u8; 16 * BS as usize];

    // Inode bitmap: index 1 (inode 2) and, unless deleted, index 11
    // (inode 12) in the second byte.
    image[(INODE_BITMAP_BLOCK * BS as u64) as usize] = 0b0000_0010;
    if !file_deleted {
        image[(INODE_BITMAP_BLOCK * BS as u64) as usize + 1] = 1 << 3;
    }

    if data_reused {
        // Block bitmap index 8 marks global block id 9 as allocated.
        image[(BLOCK_BITMAP_BLOCK * BS as u64) as usize + 1] = 1 << 0;
    }

    // Inode table: inode 2 at index 1, inode 12 at index 11.
    let table = (INODE_TABLE_BLOCK * BS as u64) as usize;
    let root = raw_inode(0x41ED, BS, ROOT_DIR_BLOCK);
    image[table + INODE_SIZE..table + 2 * INODE_SIZE].copy_from_slice(&root);
    let file = raw_inode(0x81A4, FILE_CONTENT.len() as u32, FILE_DATA_BLOCK);
    image[table + 11 * INODE_SIZE..table + 12 * INODE_SIZE].copy_from_slice(&file);

    let dir = dir_block(&[(2, 0x2, "."), (2, 0x2, ".."), (12, 0x1, "hello.txt")]);
    let base = (ROOT_DIR_BLOCK * BS as u64) as usize;
    image[base..base + dir.len()].copy_from_slice(&dir);

    let base = (FILE_DATA_BLOCK * BS as u64) as usize;
    image[base..base + FILE_CONTENT.len()].copy_from_slice(FILE_CONTENT);

    image
}

fn open_image(image: &[u8]) -> (NamedTempFile, ImageReader) {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(image).unwrap();
    temp.flush().unwrap();
    let reader = ImageReader::open(temp.path()).unwrap();
    (temp, reader)
}

fn generate_snapshot(image: &[u8]) -> Snapshot {
    let (_temp, mut reader) = open_image(image);
    let cancel = AtomicBool::new(false);
    snapshot::generate(&mut reader, &meta(), 10, &cancel, None).unwrap()
}

#[test]
fn test_generate_maps_paths_and_chunks() {
    let snapshot = generate_snapshot(&build_image(false, false));

    assert_eq!(snapshot.dirs.len(), 1);
    assert_eq!(snapshot.dirs["/hello.txt"], 12);

    let entry = &snapshot.inodes[&12];
    assert_eq!(entry.size(), FILE_CONTENT.len() as u64);
    assert_eq!(
        entry.chunks(),
        &[Chunk::new(FILE_DATA_BLOCK * BS as u64, BS as u64)]
    );

    // Directories are staged for the walk but never stored as files.
    assert!(!snapshot.inodes.contains_key(&2));
}

#[test]
fn test_generate_reports_progress() {
    let (_temp, mut reader) = open_image(&build_image(false, false));
    let cancel = AtomicBool::new(false);

    let seen = std::cell::Cell::new(0usize);
    let progress = |done: usize, total: usize| {
        seen.set(done);
        assert_eq!(total, 2);
    };
    snapshot::generate(&mut reader, &meta(), 10, &cancel, Some(&progress)).unwrap();
    assert_eq!(seen.get(), 2);
}

#[test]
fn test_generate_cancel_interrupts() {
    let (_temp, mut reader) = open_image(&build_image(false, false));
    let cancel = AtomicBool::new(true);
    let err = snapshot::generate(&mut reader, &meta(), 10, &cancel, None).unwrap_err();
    assert!(matches!(err, RecoveryError::Interrupted));
}

#[test]
fn test_snapshot_json_schema_and_key_coercion() {
    let mut snapshot = Snapshot::default();
    snapshot.dirs.insert("/a.txt".to_string(), 12);
    snapshot
        .inodes
        .insert(12, FileEntry(5, vec![Chunk::new(1024, 512)]));

    let json = serde_json::to_string(&snapshot).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    // Inode ids serialize as string keys; entries as [size, chunks].
    assert_eq!(value["dirs"]["/a.txt"], 12);
    assert_eq!(value["inodes"]["12"][0], 5);
    assert_eq!(value["inodes"]["12"][1][0]["addr"], 1024);
    assert_eq!(value["inodes"]["12"][1][0]["len"], 512);

    // Loading coerces the keys back to integers.
    let loaded: Snapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded.inodes[&12], FileEntry(5, vec![Chunk::new(1024, 512)]));
}

#[test]
fn test_snapshot_save_load_round_trip() {
    let snapshot = generate_snapshot(&build_image(false, false));

    let dir = tempdir().unwrap();
    let path = dir.path().join("fs.img.snapshot.out");
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded.dirs, snapshot.dirs);
    assert_eq!(loaded.inodes, snapshot.inodes);
}

#[test]
fn test_recover_refuses_live_file_without_force() {
    let snapshot = generate_snapshot(&build_image(false, false));
    let (_temp, mut reader) = open_image(&build_image(false, false));
    let dir = tempdir().unwrap();
    let output = dir.path().join("hello.txt");

    let err = snapshot::recover(
        &mut reader,
        &meta(),
        &snapshot,
        "/hello.txt",
        &output,
        false,
    )
    .unwrap_err();
    assert!(matches!(err, RecoveryError::NotDeleted));
    assert!(!output.exists());
}

#[test]
fn test_recover_force_bypasses_validation() {
    let snapshot = generate_snapshot(&build_image(false, false));
    let (_temp, mut reader) = open_image(&build_image(false, false));
    let dir = tempdir().unwrap();
    let output = dir.path().join("hello.txt");

    let written = snapshot::recover(
        &mut reader,
        &meta(),
        &snapshot,
        "/hello.txt",
        &output,
        true,
    )
    .unwrap();
    assert_eq!(written, FILE_CONTENT.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), FILE_CONTENT);
}

#[test]
fn test_recover_deleted_file_trims_to_size() {
    let snapshot = generate_snapshot(&build_image(false, false));
    // After deletion the inode bit is clear and no blocks are reused.
    let (_temp, mut reader) = open_image(&build_image(true, false));
    let dir = tempdir().unwrap();
    let output = dir.path().join("hello.txt");

    let written = snapshot::recover(
        &mut reader,
        &meta(),
        &snapshot,
        "/hello.txt",
        &output,
        false,
    )
    .unwrap();

    // The chunk covers a whole block; output is trimmed to the file size.
    assert_eq!(written, FILE_CONTENT.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), FILE_CONTENT);
}

#[test]
fn test_recover_refuses_reallocated_blocks() {
    let snapshot = generate_snapshot(&build_image(false, false));
    let (_temp, mut reader) = open_image(&build_image(true, true));
    let dir = tempdir().unwrap();
    let output = dir.path().join("hello.txt");

    let err = snapshot::recover(
        &mut reader,
        &meta(),
        &snapshot,
        "/hello.txt",
        &output,
        false,
    )
    .unwrap_err();
    assert!(matches!(err, RecoveryError::BlocksReallocated));
    assert!(!output.exists());
}

#[test]
fn test_recover_unknown_path() {
    let snapshot = generate_snapshot(&build_image(false, false));
    let (_temp, mut reader) = open_image(&build_image(true, false));
    let dir = tempdir().unwrap();
    let output = dir.path().join("missing");

    let err = snapshot::recover(&mut reader, &meta(), &snapshot, "/missing", &output, false)
        .unwrap_err();
    assert!(matches!(err, RecoveryError::PathNotFound(_)));
}

#[test]
fn test_entry_without_chunk_data_is_malformed() {
    let mut snapshot = Snapshot::default();
    snapshot.dirs.insert("/ghost".to_string(), 99);

    let err = snapshot.entry("/ghost").unwrap_err();
    assert!(matches!(err, RecoveryError::MalformedSnapshot(_)));
}

#[test]
fn test_list_reports_recoverability() {
    let snapshot = generate_snapshot(&build_image(false, false));

    // Live file: listed but not recoverable.
    let (_temp, mut reader) = open_image(&build_image(false, false));
    let rows = snapshot::list(&mut reader, &meta(), &snapshot).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path, "/hello.txt");
    assert_eq!(rows[0].size, FILE_CONTENT.len() as u64);
    assert!(!rows[0].recoverable);

    // Deleted with free blocks: recoverable.
    let (_temp2, mut reader) = open_image(&build_image(true, false));
    let rows = snapshot::list(&mut reader, &meta(), &snapshot).unwrap();
    assert!(rows[0].recoverable);

    // Deleted but blocks reused: not recoverable.
    let (_temp3, mut reader) = open_image(&build_image(true, true));
    let rows = snapshot::list(&mut reader, &meta(), &snapshot).unwrap();
    assert!(!rows[0].recoverable);
}
