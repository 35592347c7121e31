use super::{oflag, File, FileKind};
use crate::error::{FatError, FileError, VolumeError};
use crate::testfs::{self, RamDisk};
use crate::volume::Volume;

fn vol_fat16() -> Volume<RamDisk> {
    Volume::mount(testfs::format_fat16()).unwrap()
}

fn create(vol: &mut Volume<RamDisk>, root: &File, name: &str) -> File {
    let mut f = File::new();
    f.open(vol, root, name, oflag::CREAT | oflag::RDWR).unwrap();
    f
}

fn chain_len(vol: &mut Volume<RamDisk>, first: u32) -> u32 {
    let mut len = 0;
    let mut cluster = first;
    while cluster != 0 {
        len += 1;
        cluster = vol.next_cluster(cluster).unwrap().unwrap_or(0);
    }
    len
}

#[test]
fn create_write_read_back() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "A.TXT");
    assert_eq!(f.write(&mut vol, b"hello").unwrap(), 5);
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "A.TXT", oflag::READ).unwrap();
    assert_eq!(f.size(), 5);
    let mut buf = [0u8; 16];
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 0);
}

#[test]
fn lookup_is_case_insensitive_via_upcase() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "Mixed.Txt");
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "MIXED.TXT", oflag::READ).unwrap();
    assert!(f.is_file());
}

#[test]
fn multi_cluster_file_has_exact_chain() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);
    let cluster_bytes = vol.bytes_per_cluster();

    let mut data = [0u8; 10_000];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let mut f = create(&mut vol, &root, "BIG.BIN");
    assert_eq!(f.write(&mut vol, &data).unwrap(), data.len());
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "BIG.BIN", oflag::READ).unwrap();
    assert_eq!(f.size(), 10_000);

    let expected = (10_000 + cluster_bytes - 1) / cluster_bytes;
    assert_eq!(chain_len(&mut vol, f.first_cluster()), expected);

    let mut back = [0u8; 10_000];
    assert_eq!(f.read(&mut vol, &mut back).unwrap(), back.len());
    assert_eq!(back[..], data[..]);
}

#[test]
fn writes_crossing_cluster_boundaries() {
    let mut vol = Volume::mount(testfs::format_fat16_spc4()).unwrap();
    let root = File::open_root(&vol);
    assert_eq!(vol.bytes_per_cluster(), 2048);

    let mut f = create(&mut vol, &root, "SPAN.BIN");
    // Land the second write across the first cluster boundary.
    f.write(&mut vol, &[0xAA; 2000]).unwrap();
    f.write(&mut vol, &[0xBB; 100]).unwrap();
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "SPAN.BIN", oflag::READ).unwrap();
    f.seek(&mut vol, 1990).unwrap();
    let mut buf = [0u8; 30];
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 30);
    assert_eq!(&buf[..10], &[0xAA; 10]);
    assert_eq!(&buf[10..], &[0xBB; 20]);
}

#[test]
fn seek_bounds_and_backward_walk() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "SEEK.BIN");
    f.write(&mut vol, &[7u8; 1500]).unwrap();

    assert_eq!(
        f.seek(&mut vol, 1501),
        Err(FatError::File(FileError::OutOfRange))
    );
    // Equal to size is the append position.
    f.seek(&mut vol, 1500).unwrap();

    f.seek(&mut vol, 1400).unwrap();
    f.seek(&mut vol, 100).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 1);
    assert_eq!(buf[0], 7);

    f.seek_cur(&mut vol, -101).unwrap();
    assert_eq!(f.position(), 0);
    assert_eq!(
        f.seek_cur(&mut vol, -1),
        Err(FatError::File(FileError::OutOfRange))
    );
    f.seek_end(&mut vol, -1500).unwrap();
    assert_eq!(f.position(), 0);
}

#[test]
fn append_flag_writes_at_end() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "LOG.TXT");
    f.write(&mut vol, b"one").unwrap();
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "LOG.TXT", oflag::RDWR | oflag::APPEND)
        .unwrap();
    f.write(&mut vol, b"two").unwrap();
    f.seek(&mut vol, 0).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"onetwo");
}

#[test]
fn truncate_shrinks_and_frees() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "T.BIN");
    f.write(&mut vol, &[1u8; 2000]).unwrap();
    assert_eq!(chain_len(&mut vol, f.first_cluster()), 4);

    f.truncate(&mut vol, 600).unwrap();
    assert_eq!(f.size(), 600);
    assert_eq!(f.position(), 600);
    assert_eq!(chain_len(&mut vol, f.first_cluster()), 2);

    assert_eq!(
        f.truncate(&mut vol, 601),
        Err(FatError::File(FileError::OutOfRange))
    );

    f.truncate(&mut vol, 0).unwrap();
    assert_eq!(f.size(), 0);
    assert_eq!(f.first_cluster(), 0);
    f.close(&mut vol).unwrap();
}

#[test]
fn trunc_flag_empties_existing_file() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "T2.BIN");
    f.write(&mut vol, &[9u8; 900]).unwrap();
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "T2.BIN", oflag::RDWR | oflag::TRUNC)
        .unwrap();
    assert_eq!(f.size(), 0);
    assert_eq!(f.first_cluster(), 0);
    f.close(&mut vol).unwrap();
}

#[test]
fn excl_refuses_existing() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "X.TXT");
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    assert_eq!(
        f.open(
            &mut vol,
            &root,
            "X.TXT",
            oflag::CREAT | oflag::EXCL | oflag::RDWR,
        ),
        Err(FatError::File(FileError::AlreadyExists))
    );
    assert!(!f.is_open());
}

#[test]
fn open_on_open_handle_is_rejected() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "ONCE.TXT");
    assert_eq!(
        f.open(&mut vol, &root, "ONCE.TXT", oflag::READ),
        Err(FatError::File(FileError::AlreadyOpen))
    );
    // The handle stays bound to the first open.
    assert!(f.is_open());
    f.close(&mut vol).unwrap();
    f.open(&mut vol, &root, "ONCE.TXT", oflag::READ).unwrap();
}

#[test]
fn plain_file_cannot_serve_as_parent() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let parent = create(&mut vol, &root, "PLAIN.BIN");
    let mut f = File::new();
    assert_eq!(
        f.open(&mut vol, &parent, "X.TXT", oflag::CREAT | oflag::RDWR),
        Err(FatError::File(FileError::NotADirectory))
    );
    assert!(!f.is_open());
}

#[test]
fn open_without_creat_requires_existing() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = File::new();
    assert_eq!(
        f.open(&mut vol, &root, "GHOST.TXT", oflag::READ),
        Err(FatError::File(FileError::NotFound))
    );
}

#[test]
fn removed_handle_rejects_io() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "GONE.TXT");
    f.write(&mut vol, b"bye").unwrap();
    f.remove(&mut vol).unwrap();

    assert!(!f.is_open());
    let mut buf = [0u8; 4];
    assert_eq!(
        f.read(&mut vol, &mut buf),
        Err(FatError::File(FileError::NotOpen))
    );
    assert_eq!(
        f.write(&mut vol, b"x"),
        Err(FatError::File(FileError::NotOpen))
    );

    let mut again = File::new();
    assert_eq!(
        again.open(&mut vol, &root, "GONE.TXT", oflag::READ),
        Err(FatError::File(FileError::NotFound))
    );
}

#[test]
fn remove_frees_the_chain() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "FREED.BIN");
    f.write(&mut vol, &[2u8; 1536]).unwrap();
    let first = f.first_cluster();
    f.remove(&mut vol).unwrap();

    assert_eq!(vol.fat_entry(first).unwrap(), 0);
    assert_eq!(vol.fat_entry(first + 1).unwrap(), 0);
    assert_eq!(vol.fat_entry(first + 2).unwrap(), 0);
}

#[test]
fn read_only_open_rejects_writes() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "RO.TXT");
    f.write(&mut vol, b"data").unwrap();
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "RO.TXT", oflag::READ).unwrap();
    assert_eq!(
        f.write(&mut vol, b"nope"),
        Err(FatError::File(FileError::ReadOnly))
    );
    assert_eq!(
        f.truncate(&mut vol, 0),
        Err(FatError::File(FileError::ReadOnly))
    );
}

#[test]
fn rename_conflict_leaves_both_entries() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut a = create(&mut vol, &root, "A.TXT");
    a.write(&mut vol, b"aaa").unwrap();
    a.close(&mut vol).unwrap();
    let mut b = create(&mut vol, &root, "B.TXT");
    b.write(&mut vol, b"bbbb").unwrap();
    b.close(&mut vol).unwrap();

    let mut a = File::new();
    a.open(&mut vol, &root, "A.TXT", oflag::READ).unwrap();
    assert_eq!(
        a.rename(&mut vol, &root, "B.TXT"),
        Err(FatError::File(FileError::AlreadyExists))
    );
    a.close(&mut vol).unwrap();

    let mut f = File::new();
    f.open(&mut vol, &root, "A.TXT", oflag::READ).unwrap();
    assert_eq!(f.size(), 3);
    let mut f = File::new();
    f.open(&mut vol, &root, "B.TXT", oflag::READ).unwrap();
    assert_eq!(f.size(), 4);
}

#[test]
fn rename_within_directory_keeps_contents() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "OLD.TXT");
    f.write(&mut vol, b"payload").unwrap();
    f.rename(&mut vol, &root, "NEW.TXT").unwrap();
    f.close(&mut vol).unwrap();

    let mut f = File::new();
    assert_eq!(
        f.open(&mut vol, &root, "OLD.TXT", oflag::READ),
        Err(FatError::File(FileError::NotFound))
    );
    let mut f = File::new();
    f.open(&mut vol, &root, "NEW.TXT", oflag::READ).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(f.read(&mut vol, &mut buf).unwrap(), 7);
    assert_eq!(&buf[..7], b"payload");
}

#[test]
fn make_dir_seeds_dot_entries() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut d = File::new();
    d.make_dir(&mut vol, &root, "SUB").unwrap();
    assert_eq!(d.kind(), FileKind::SubDir);

    d.rewind();
    let dot = d.next_entry(&mut vol).unwrap().unwrap();
    assert_eq!(dot.name, crate::dir::DOT_NAME);
    assert_eq!(dot.first_cluster, d.first_cluster());
    let dotdot = d.next_entry(&mut vol).unwrap().unwrap();
    assert_eq!(dotdot.name, crate::dir::DOTDOT_NAME);
    assert_eq!(dotdot.first_cluster, 0);
    assert!(d.next_entry(&mut vol).unwrap().is_none());
}

#[test]
fn directory_opens_read_only() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut d = File::new();
    d.make_dir(&mut vol, &root, "DIR").unwrap();
    d.close(&mut vol).unwrap();

    let mut d = File::new();
    assert_eq!(
        d.open(&mut vol, &root, "DIR", oflag::RDWR),
        Err(FatError::File(FileError::IsDirectory))
    );
    d = File::new();
    d.open(&mut vol, &root, "DIR", oflag::READ).unwrap();
    assert!(d.is_dir());
}

#[test]
fn fixed_root_cannot_grow() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);
    assert_eq!(root.kind(), FileKind::RootFixed);

    // The root holds 512 slots; filling them all leaves no free slot
    // and no chain to extend.
    for i in 0..512 {
        let name = std::format!("F{}.BIN", i);
        let mut f = File::new();
        match f.open(&mut vol, &root, &name, oflag::CREAT | oflag::RDWR) {
            Ok(()) => f.close(&mut vol).unwrap(),
            Err(err) => {
                assert_eq!(err, FatError::File(FileError::DiskFull));
                return;
            }
        }
    }
    let mut f = File::new();
    assert_eq!(
        f.open(&mut vol, &root, "LAST.BIN", oflag::CREAT | oflag::RDWR),
        Err(FatError::File(FileError::DiskFull))
    );
}

#[test]
fn subdirectory_grows_past_one_cluster() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut d = File::new();
    d.make_dir(&mut vol, &root, "MANY").unwrap();

    // One 512-byte cluster holds 16 slots, two taken by dot entries.
    for i in 0..20 {
        let name = std::format!("E{}.DAT", i);
        let mut f = File::new();
        f.open(&mut vol, &d, &name, oflag::CREAT | oflag::RDWR).unwrap();
        f.close(&mut vol).unwrap();
    }
    assert!(chain_len(&mut vol, d.first_cluster()) >= 2);

    let mut f = File::new();
    f.open(&mut vol, &d, "E19.DAT", oflag::READ).unwrap();
    assert!(f.is_file());
}

#[test]
fn looped_directory_chain_is_corruption() {
    let mut vol = vol_fat16();
    let root = File::open_root(&vol);

    let mut d = File::new();
    d.make_dir(&mut vol, &root, "LOOP").unwrap();
    // Fill the cluster's 16 slots so a lookup must follow the chain.
    for i in 0..14 {
        let name = std::format!("P{}.DAT", i);
        let mut f = File::new();
        f.open(&mut vol, &d, &name, oflag::CREAT | oflag::RDWR).unwrap();
        f.close(&mut vol).unwrap();
    }
    let cluster = d.first_cluster();
    vol.set_fat_entry(cluster, cluster).unwrap();

    let mut f = File::new();
    assert_eq!(
        f.open(&mut vol, &d, "MISSING.DAT", oflag::READ),
        Err(FatError::Volume(VolumeError::Corruption))
    );
}

#[test]
fn disk_full_write_reports_short_then_fails() {
    let mut vol = Volume::mount(testfs::format_fat12()).unwrap();
    let root = File::open_root(&vol);

    let mut f = create(&mut vol, &root, "FILL.BIN");
    let block = [0u8; 3000];
    let mut total = 0usize;
    loop {
        match f.write(&mut vol, &block) {
            Ok(n) => {
                total += n;
                if n < block.len() {
                    break;
                }
            }
            Err(err) => panic!("expected a short write first, got {:?}", err),
        }
    }
    // 1000 clusters of 512 bytes, minus nothing else allocated.
    assert_eq!(total, 1000 * 512);
    assert_eq!(
        f.write(&mut vol, &block),
        Err(FatError::File(FileError::DiskFull))
    );
    // Everything written so far is still intact.
    f.seek(&mut vol, 0).unwrap();
    assert_eq!(f.size(), 1000 * 512);
}
