use rancor::Panic;

use crate::{
    api::to_bytes,
    finalize::Finalized,
    format::{Format, Primitive},
    member::{Member, MemberWriter},
    stream::DataWriter,
};

pub fn finalize(stream: DataWriter) -> (Vec<u8>, Finalized) {
    to_bytes::<Panic>(stream).expect("failed to finalize stream")
}

pub fn write_members(format: Format, root: &Member) -> (Vec<u8>, Finalized) {
    let mut writer = MemberWriter::new(format);
    writer
        .write_root::<Panic>(root)
        .expect("failed to write root");
    let (bytes, finalized, _) = writer
        .into_bytes::<Panic>()
        .expect("failed to finalize stream");
    (bytes, finalized)
}

pub fn read<P: Primitive>(bytes: &[u8], at: usize, format: &Format) -> P {
    format.decode(&bytes[at..at + P::SIZE])
}

pub fn object(fields: Vec<(&str, Member)>) -> Member {
    Member::Object(
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}
