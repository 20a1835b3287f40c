use blockstream::{
    api::{read_pointer, relocate, to_bytes, Header},
    hash::{BlockHash, BlockHasher},
    layout::HEADER_SIZE,
    rancor::{Error, Panic},
    ser::writer::{Buffer, IoWriter},
    DataWriter, Finalized, Format, StreamReference,
};

const FORMAT: Format = Format::LITTLE_32;

fn finalize(stream: DataWriter) -> (Vec<u8>, Finalized) {
    to_bytes::<Panic>(stream).unwrap()
}

fn u32_at(bytes: &[u8], at: u64) -> u32 {
    FORMAT.decode(&bytes[at as usize..at as usize + 4])
}

fn leaf(stream: &mut DataWriter, reference: StreamReference, value: i32) {
    stream.begin_block_with::<Panic>(reference, 4).unwrap();
    stream.write(value);
    stream.end_block();
}

#[test]
fn distinct_blocks_are_laid_out_naively() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let children = [stream.reserve(), stream.reserve(), stream.reserve()];
    for child in children {
        stream.write_reference(child);
    }
    stream.end_block();
    for (value, child) in (1..).zip(children) {
        leaf(&mut stream, child, value);
    }

    let (bytes, finalized) = finalize(stream);

    assert_eq!(finalized.blocks_written(), 4);
    assert_eq!(finalized.blocks_collapsed(), 0);
    assert_eq!(finalized.rounds(), 1);
    assert_eq!(bytes.len(), HEADER_SIZE + 12 + 3 * 4);
    for (i, child) in children.into_iter().enumerate() {
        let offset = finalized.offset_of(child).unwrap();
        assert_eq!(offset, 28 + 4 * i as u64);
        assert_eq!(u32_at(&bytes, 16 + 4 * i as u64) as u64, offset);
        assert_eq!(u32_at(&bytes, offset), i as u32 + 1);
    }
}

#[test]
fn identical_blocks_collapse() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let (a, b) = (stream.reserve(), stream.reserve());
    stream.write_reference(a);
    stream.write_reference(b);
    stream.end_block();
    leaf(&mut stream, a, 9);
    leaf(&mut stream, b, 9);

    let (bytes, finalized) = finalize(stream);

    assert_eq!(finalized.blocks_written(), 2);
    assert_eq!(finalized.alias_of(b), a);
    let survivor = finalized.offset_of(a).unwrap();
    assert_eq!(finalized.offset_of(b), Some(survivor));
    assert_eq!(u32_at(&bytes, 16) as u64, survivor);
    assert_eq!(u32_at(&bytes, 20) as u64, survivor);
}

#[test]
fn collapse_cascades_to_parents() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let (a, b) = (stream.reserve(), stream.reserve());
    stream.write_reference(a);
    stream.write_reference(b);
    stream.end_block();

    let (l1, l2) = (stream.reserve(), stream.reserve());
    for (parent, target) in [(a, l1), (b, l2)] {
        stream.begin_block_with::<Panic>(parent, 4).unwrap();
        stream.write_reference(target);
        stream.end_block();
    }
    leaf(&mut stream, l1, 42);
    leaf(&mut stream, l2, 42);

    let (bytes, finalized) = finalize(stream);

    assert_eq!(finalized.blocks_collapsed(), 2);
    assert_eq!(finalized.blocks_written(), 3);
    assert!(finalized.rounds() >= 3);
    assert_eq!(finalized.offset_of(a), finalized.offset_of(b));
    assert_eq!(finalized.offset_of(l1), finalized.offset_of(l2));

    let parent = finalized.offset_of(a).unwrap();
    let leaf = finalized.offset_of(l1).unwrap();
    assert_eq!(u32_at(&bytes, parent) as u64, leaf);
}

#[test]
fn null_slots_stay_zero_and_unrelocated() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    stream.write(7u32);
    stream.write_reference(StreamReference::EMPTY);
    stream.end_block();

    let (bytes, finalized) = finalize(stream);

    assert_eq!(u32_at(&bytes, 20), 0);
    assert_eq!(finalized.relocations(), &[8]);
    assert!(finalized.is_complete());
    assert!(finalized
        .references()
        .iter()
        .all(|(reference, _)| !reference.is_empty()));
}

#[test]
fn mixed_primitives_keep_natural_alignment() {
    let format = Format::LITTLE_64;
    let mut stream = DataWriter::new(format);
    stream.begin_block(1);
    stream.write(1u8);
    stream.write_aligned(2u16);
    stream.write_aligned(3u32);
    stream.write_aligned(4.0f64);
    stream.write(5i8);
    stream.write_aligned(6i64);
    stream.end_block();

    let (bytes, finalized) = finalize(stream);
    let root = read_pointer(&bytes, 8, &format) as usize;

    assert_eq!(root % 8, 0);
    assert_eq!(bytes[root], 1);
    assert_eq!(&bytes[root + 2..root + 4], &2u16.to_le_bytes());
    assert_eq!(&bytes[root + 4..root + 8], &3u32.to_le_bytes());
    assert_eq!(&bytes[root + 8..root + 16], &4.0f64.to_le_bytes());
    assert_eq!(bytes[root + 16], 5);
    assert_eq!(&bytes[root + 24..root + 32], &6i64.to_le_bytes());
    assert_eq!(finalized.len(), root + 32);
}

#[test]
#[should_panic(expected = "misaligned write")]
fn misaligned_write_panics() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    stream.write(1u16);
    stream.write(2u32);
}

fn build_graph() -> DataWriter {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let nodes = (0..6).map(|_| stream.reserve()).collect::<Vec<_>>();
    for &node in &nodes {
        stream.write_reference(node);
    }
    stream.end_block();

    for (i, &node) in nodes.iter().enumerate() {
        stream.begin_block_with::<Panic>(node, 4).unwrap();
        stream.write((i % 3) as u32);
        stream.write_reference(nodes[(i + 1) % nodes.len()]);
        stream.end_block();
    }
    stream
}

#[test]
fn output_is_deterministic() {
    let (first, first_final) = finalize(build_graph());
    let (second, second_final) = finalize(build_graph());

    assert_eq!(first, second);
    assert_eq!(first_final.relocations(), second_final.relocations());
    assert_eq!(first_final.markers(), second_final.markers());
}

#[test]
fn unresolved_references_are_reported() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let missing = stream.reserve();
    stream.label(missing, "root.weapon");
    stream.write(1u32);
    stream.write_reference(missing);
    stream.end_block();

    let (bytes, finalized) = finalize(stream);

    let unresolved = finalized.unresolved();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].reference, missing);
    assert_eq!(unresolved[0].slots, vec![20]);
    assert_eq!(unresolved[0].label.as_deref(), Some("root.weapon"));
    assert_eq!(u32_at(&bytes, 20), 0);
    assert!(!finalized.relocations().contains(&20));
}

#[test]
fn forward_reference_scenario() {
    let mut stream = DataWriter::new(FORMAT);
    let r1 = stream.begin_block(4);
    stream.write(42i32);
    let r2 = stream.reserve();
    stream.write_reference(r2);
    stream.end_block();

    leaf(&mut stream, r2, 42);
    let r3 = stream.begin_block(4);
    stream.write(42i32);
    stream.end_block();

    let (bytes, finalized) = finalize(stream);

    assert_eq!(finalized.root(), r1);
    assert_eq!(finalized.alias_of(r3), r2);
    assert_eq!(finalized.blocks_written(), 2);
    let survivor = finalized.offset_of(r2).unwrap();
    assert_eq!(finalized.offset_of(r3), Some(survivor));
    assert_eq!(u32_at(&bytes, 20) as u64, survivor);
    assert_eq!(finalized.relocations(), &[8, 20]);
}

#[test]
fn markers_survive_collapse() {
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let (a, b, inner) = (stream.reserve(), stream.reserve(), stream.reserve());
    stream.write_reference(a);
    stream.write_reference(inner);
    stream.end_block();

    leaf(&mut stream, a, 3);
    stream.begin_block_with::<Panic>(b, 4).unwrap();
    stream.mark::<Panic>(inner).unwrap();
    stream.write(3i32);
    stream.end_block();

    let (bytes, finalized) = finalize(stream);

    let survivor = finalized.offset_of(a).unwrap();
    assert_eq!(finalized.offset_of(inner), Some(survivor));
    assert_eq!(finalized.markers(), &[(inner, survivor)]);
    assert_eq!(u32_at(&bytes, 20) as u64, survivor);
}

#[test]
fn header_describes_the_stream() {
    let format = Format::BIG_64;
    let mut stream = DataWriter::new(format);
    stream.begin_block(8);
    stream.write(1u64);
    stream.end_block();

    let (bytes, _) = to_bytes::<Error>(stream).unwrap();
    let header = Header::read::<Error>(&bytes).unwrap();

    assert_eq!(header.format, format);
    assert_eq!(header.root, HEADER_SIZE as u64);
}

#[test]
fn relocated_pointers_are_absolute() {
    let (mut bytes, finalized) = finalize(build_graph());
    let original = bytes.clone();
    relocate(&mut bytes, finalized.relocations(), 0x4000, &FORMAT);

    for &slot in finalized.relocations() {
        assert_eq!(u32_at(&bytes, slot), u32_at(&original, slot) + 0x4000);
    }
}

#[test]
fn sinks_agree() {
    let (expected, _) = finalize(build_graph());

    let mut storage = [0u8; 256];
    let mut buffer = Buffer::from(&mut storage);
    build_graph().finalize::<_, Panic>(&mut buffer).unwrap();
    assert_eq!(&*buffer, expected.as_slice());

    let mut io = IoWriter::new(std::io::Cursor::new(Vec::new()));
    build_graph().finalize::<_, Error>(&mut io).unwrap();
    assert_eq!(io.into_inner().into_inner(), expected);
}

#[test]
fn small_buffers_overflow() {
    let mut storage = [0u8; 20];
    let mut buffer = Buffer::from(&mut storage);
    assert!(build_graph().finalize::<_, Error>(&mut buffer).is_err());
}

fn unit(name: &str) -> BlockHash {
    let mut hasher = BlockHasher::new();
    hasher.update(name.as_bytes());
    hasher.finish()
}

#[test]
fn data_units_collapse_separately() {
    let (cars, tracks) = (unit("cars"), unit("tracks"));
    let mut stream = DataWriter::new(FORMAT);
    stream.begin_block(4);
    let leaves = [stream.reserve(), stream.reserve(), stream.reserve()];
    for target in leaves {
        stream.write_reference(target);
    }
    stream.end_block();

    stream.open_data_unit(cars);
    leaf(&mut stream, leaves[0], 7);
    leaf(&mut stream, leaves[1], 7);
    stream.close_data_unit();
    stream.open_data_unit(tracks);
    leaf(&mut stream, leaves[2], 7);
    stream.close_data_unit();

    let (bytes, finalized) = finalize(stream);

    assert_eq!(finalized.blocks_collapsed(), 1);
    assert_eq!(finalized.alias_of(leaves[1]), leaves[0]);
    assert_ne!(finalized.offset_of(leaves[0]), finalized.offset_of(leaves[2]));

    let units = finalized
        .units()
        .iter()
        .map(|unit| (unit.signature, unit.offset, unit.len))
        .collect::<Vec<_>>();
    assert_eq!(
        units,
        [(None, 16, 12), (Some(cars), 32, 4), (Some(tracks), 48, 4)]
    );

    assert_eq!(u32_at(&bytes, 16), 32);
    assert_eq!(u32_at(&bytes, 20), 32);
    assert_eq!(u32_at(&bytes, 24), 48);
    assert_eq!(finalized.relocations(), &[8, 16, 20, 24]);
    assert_eq!(bytes.len(), 52);
}
