use std::io::Cursor;

use similar_asserts::assert_eq;

use super::*;

#[test]
fn encodes_header_records_and_footer() {
    let bytes = encode_patch(&[Block::new(0x8000, [0xEA, 0x60])], 0).expect("encode");
    assert_eq!(
        bytes,
        b"PATCH\x00\x80\x00\x00\x02\xEA\x60EOF".to_vec()
    );
}

#[test]
fn block_round_trips() {
    let block = Block::new(0x8000, vec![1, 2, 3, 4]);
    let bytes = encode_patch(std::slice::from_ref(&block), 0).expect("encode");
    assert_eq!(decode_patch(&bytes).expect("decode"), vec![block]);
}

#[test]
fn long_blocks_split_into_contiguous_records() {
    let payload: Vec<u8> = (0..0x1_0010u32).map(|value| value as u8).collect();
    let bytes = encode_patch(&[Block::new(0x1000, payload.clone())], 0).expect("encode");
    let records = decode_patch(&bytes).expect("decode");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].address, 0x1000);
    assert_eq!(records[0].bytes.len(), MAX_RECORD_LEN);
    assert_eq!(records[1].address, records[0].end());
    let joined: Vec<u8> = records.into_iter().flat_map(|record| record.bytes).collect();
    assert_eq!(joined, payload);
}

#[test]
fn copier_header_only_moves_record_addresses() {
    let mut writer = IpsWriter::new(Vec::new()).with_copier_header(true);
    write_blocks(&mut writer, &[Block::new(0x10, [0xAA])]).expect("write");
    let records = decode_patch(&writer.into_inner()).expect("decode");
    assert_eq!(records, vec![Block::new(0x210, [0xAA])]);
}

#[test]
fn rejects_missing_header() {
    let err = decode_patch(b"PAT").expect_err("short header");
    assert!(err.to_string().contains("PATCH"));
    let err = decode_patch(b"XXXXXEOF").expect_err("bad header");
    assert!(err.to_string().contains("PATCH"));
}

#[test]
fn rejects_truncated_records() {
    let err = decode_patch(b"PATCH\x00\x80\x00\x00\x04\x01").expect_err("truncated");
    assert!(format!("{err:#}").contains("truncated record"));
}

#[test]
fn rejects_addresses_that_look_like_the_footer() {
    let err = encode_patch(&[Block::new(0x454F46, [0])], 0).expect_err("footer clash");
    assert!(err.to_string().contains("end marker"));
}

#[test]
fn sfc_writer_seeks_to_block_addresses() {
    let mut writer = SfcWriter::new(Cursor::new(vec![0u8; 8]));
    write_blocks(
        &mut writer,
        &[Block::new(2, [0xAA, 0xBB]), Block::new(6, [0xCC])],
    )
    .expect("write");
    assert_eq!(
        writer.into_inner().into_inner(),
        vec![0, 0, 0xAA, 0xBB, 0, 0, 0xCC, 0]
    );
}

#[test]
fn patch_files_round_trip_through_disk() {
    let unique = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("a816-ips-{unique}.ips"));
    let blocks = vec![Block::new(0x20, [1, 2]), Block::new(0x8000, [3])];
    write_patch(&path, &blocks, false).expect("write");
    assert_eq!(read_patch(&path).expect("read"), blocks);
    let _ = std::fs::remove_file(path);
}
