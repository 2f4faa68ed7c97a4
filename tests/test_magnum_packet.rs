mod common;
use common::*;

#[test]
fn classifies_by_length_and_header() {
    common_setup();
    let mut ctx = DecoderContext::new();

    let cases = [
        (Factory::rtr(), PacketType::Rtr),
        (Factory::ags_status(), PacketType::AgsStatus),
        (Factory::ags_counters(), PacketType::AgsCounters),
        (Factory::bmk_status(), PacketType::BmkStatus),
        (Factory::pt_status(), PacketType::PtStatus),
        (Factory::pt_ratings(), PacketType::PtRatings),
        (Factory::pt_daily(), PacketType::PtDaily),
        (Factory::pt_faults(), PacketType::PtFaults),
    ];

    for (bytes, expected) in cases {
        assert_eq!(packet::classify(&bytes, &mut ctx), expected);
    }
}

#[test]
fn wrong_header_for_length_is_unknown() {
    let mut ctx = DecoderContext::new();

    // right length for an RTR, wrong first byte
    assert_eq!(
        packet::classify(&[0x92, 31], &mut ctx),
        PacketType::Unknown
    );
    // length nothing emits
    assert_eq!(
        packet::classify(&[0xA1, 1, 2, 3], &mut ctx),
        PacketType::Unknown
    );
}

#[test]
fn tagged_remote_classification() {
    let mut ctx = DecoderContext::new();

    assert_eq!(
        packet::classify(&Factory::remote_ags_soc(), &mut ctx),
        PacketType::Remote(RemoteTag::AgsSoc)
    );

    // 21 bytes with an unassigned tag byte is a fragment, not a remote
    let mut bytes = Factory::remote_ags_soc().to_vec();
    bytes[20] = 0x55;
    assert_eq!(packet::classify(&bytes, &mut ctx), PacketType::Unknown);
}

#[test]
fn first_inverter_packet_latches_identity() {
    let mut ctx = DecoderContext::new();
    assert_eq!(ctx.identity(), None);

    assert_eq!(
        packet::classify(&Factory::inverter(), &mut ctx),
        PacketType::Inverter
    );
    assert_eq!(ctx.identity(), Some((30, 107)));

    // same identity keeps resolving to the inverter
    assert_eq!(
        packet::classify(&Factory::inverter(), &mut ctx),
        PacketType::Inverter
    );

    // a zero-terminated 21-byte packet with a different revision/model
    // pair must be the remote, whatever it claims to be
    assert_eq!(
        packet::classify(&Factory::inverter_imposter(), &mut ctx),
        PacketType::Remote(RemoteTag::Base)
    );
    assert_eq!(ctx.identity(), Some((30, 107)));
}

#[test]
fn zero_tail_announcement_never_latches() {
    let mut ctx = DecoderContext::new();

    assert_eq!(
        packet::classify(&Factory::remote_announcement(), &mut ctx),
        PacketType::Remote(RemoteTag::Base)
    );
    assert_eq!(ctx.identity(), None);
}

#[test]
fn multiplier_follows_model_class() {
    let mut ctx = DecoderContext::new();
    assert_eq!(ctx.multiplier(), 1.0);

    for (model, expected) in [(50, 1.0), (51, 2.0), (107, 2.0), (108, 4.0), (150, 4.0)] {
        ctx.set_multiplier_for_model(model);
        assert_eq!(ctx.multiplier(), expected, "model {}", model);
    }

    // out-of-range models leave the previous value in place
    ctx.set_multiplier_for_model(200);
    assert_eq!(ctx.multiplier(), 4.0);
}

#[test]
fn padded_packet_is_truncated_to_21() {
    let mut ctx = DecoderContext::new();

    let mut padded = Factory::inverter().to_vec();
    padded.push(0xFF);
    assert_eq!(padded.len(), 22);

    let message = packet::parse(bytes::Bytes::from(padded), &mut ctx).unwrap();
    assert_eq!(message.packet_type, PacketType::Inverter);
    assert_eq!(message.bytes.len(), 21);
    assert_eq!(message.fields.len(), 18);
}

#[test]
fn unknown_parses_with_no_fields() {
    let mut ctx = DecoderContext::new();

    let message = packet::parse(bytes::Bytes::from_static(&[1, 2, 3]), &mut ctx).unwrap();
    assert_eq!(message.packet_type, PacketType::Unknown);
    assert!(message.fields.is_empty());
}

#[test]
fn unpack_rejects_size_mismatch() {
    let err = packet::unpack(PacketType::BmkStatus, &[0u8; 17]).unwrap_err();
    assert!(err.to_string().contains("BMK_81"));
}

#[test]
fn unpack_decodes_signed_and_wide_fields() {
    let fields = packet::unpack(PacketType::BmkStatus, &Factory::bmk_status()).unwrap();
    assert_eq!(fields[1], 75);
    assert_eq!(fields[2], 2550);
    assert_eq!(fields[3], -15);
    assert_eq!(fields[6], -10);
}
