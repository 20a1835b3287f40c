use blockstream::{
    api::to_bytes_in,
    member::{Member, MemberWriter},
    rancor::Failure,
    ser::writer::VecWriter,
    DataWriter,
};
use divan::{black_box, Bencher};
use rand::Rng;
use rand_pcg::Lcg64Xsh32;

fn rng() -> Lcg64Xsh32 {
    // nothing up our sleeves, state and stream are first 20 digits of pi
    const STATE: u64 = 3141592653;
    const STREAM: u64 = 5897932384;

    Lcg64Xsh32::new(STATE, STREAM)
}

const NAMES: [&str; 8] = [
    "sword", "shield", "bow", "arrow", "helmet", "boots", "ring", "amulet",
];

fn item<R: Rng>(rng: &mut R) -> Member {
    Member::Object(vec![
        (
            "name".into(),
            Member::String(NAMES[rng.gen_range(0..NAMES.len())].into()),
        ),
        ("level".into(), Member::U16(rng.gen_range(1..=4))),
        ("weight".into(), Member::F32(rng.gen_range(1..=3) as f32)),
    ])
}

fn inventory(len: usize) -> Member {
    let mut rng = rng();
    let bags = (0..len)
        .map(|_| {
            let items =
                (0..rng.gen_range(1..=4)).map(|_| item(&mut rng)).collect();
            Member::Object(vec![("items".into(), Member::Array(items))])
        })
        .collect();
    Member::Object(vec![("bags".into(), Member::Array(bags))])
}

// Every leaf has a twin somewhere else in the chain, so each round only
// exposes the next level of duplicates.
fn twin_chains(depth: usize) -> DataWriter {
    let mut stream = DataWriter::default();
    stream.begin_block(4);
    let heads = [stream.reserve(), stream.reserve()];
    for head in heads {
        stream.write_reference(head);
    }
    stream.end_block();

    for head in heads {
        let mut next = head;
        for level in 0..depth {
            stream.begin_block_with::<Failure>(next, 4).unwrap();
            stream.write(level as u32);
            next = stream.reserve();
            stream.write_reference(next);
            stream.end_block();
        }
        stream.begin_block_with::<Failure>(next, 4).unwrap();
        stream.end_block();
    }
    stream
}

#[divan::bench(args = [100, 1000, 10000])]
fn members(bencher: Bencher, len: usize) {
    let data = inventory(len);

    bencher.bench_local(|| {
        let mut writer = MemberWriter::default();
        writer.write_root::<Failure>(black_box(&data)).unwrap();
        writer.into_bytes::<Failure>().unwrap()
    });
}

#[divan::bench(args = [8, 64, 256])]
fn cascade(bencher: Bencher, depth: usize) {
    bencher
        .with_inputs(|| twin_chains(depth))
        .bench_local_values(|stream| {
            to_bytes_in::<_, Failure>(
                stream,
                VecWriter::with_capacity(16 * depth),
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
