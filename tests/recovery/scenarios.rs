//! Device table recovery over synthetic images.

use nickelscan::config::{Markers, RecoveryConfig};
use nickelscan::layout::{Endianness, PointerWidth, RecordLayout};
use nickelscan::memory::{Perms, Segment, VirtualAddressSpace};
use nickelscan::recovery::{self, DeviceRecord, RecoveryError, StructRecovery};

use crate::common::markers::{KOBO_TOUCH, TOUCH_ID, TRILOGY};
use crate::common::test_utils::ImageBuilder;

const BASE: u64 = 0x2_0000;

fn device(codename: &str, family: &str, id: &str, name: &str) -> DeviceRecord {
    DeviceRecord {
        codename: codename.to_string(),
        family: family.to_string(),
        id: id.to_string(),
        name: name.to_string(),
    }
}

#[test]
fn single_record_between_padding_and_terminator() {
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    image.null_record();
    image.null_record();
    image.record([cn, cn, id, name]);
    image.null_record();
    let space = image.into_space();

    let records = recovery::recover(&space, &RecoveryConfig::default()).unwrap();
    assert_eq!(records, vec![device(TRILOGY, TRILOGY, TOUCH_ID, KOBO_TOUCH)]);
}

#[test]
fn table_extends_before_the_anchor_and_stops_at_terminator() {
    let mut image = ImageBuilder::new(BASE);
    let glo_id = image.string("00000000-0000-0000-0000-000000000370");
    let kraken = image.string("kraken");
    let glo = image.string("Kobo Glo");
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    let aura_id = image.string("00000000-0000-0000-0000-000000000360");
    let phoenix = image.string("phoenix");
    let aura = image.string("Kobo Aura");

    image.null_record();
    image.record([kraken, kraken, glo_id, glo]);
    image.record([cn, cn, id, name]);
    image.null_record();
    // a valid record past the terminator belongs to another table
    image.record([phoenix, phoenix, aura_id, aura]);
    image.null_record();
    let space = image.into_space();

    let records = recovery::recover(&space, &RecoveryConfig::default()).unwrap();
    assert_eq!(
        records,
        vec![
            device("kraken", "kraken", "00000000-0000-0000-0000-000000000370", "Kobo Glo"),
            device(TRILOGY, TRILOGY, TOUCH_ID, KOBO_TOUCH),
        ]
    );
}

#[test]
fn family_may_differ_from_codename() {
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    let nova_id = image.string("00000000-0000-0000-0000-000000000382");
    let nova = image.string("nova");
    let pika = image.string("pika");
    let nova_name = image.string("Kobo Nia");

    image.null_record();
    image.record([cn, cn, id, name]);
    image.record([nova, pika, nova_id, nova_name]);
    image.null_record();
    let space = image.into_space();

    let records = recovery::recover(&space, &RecoveryConfig::default()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].codename, "nova");
    assert_eq!(records[1].family, "pika");
}

#[test]
fn foreign_record_after_table_ends_it() {
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    let foreign = image.string("12345678-aaaa-bbbb-cccc-000000000000");

    image.null_record();
    image.record([cn, cn, id, name]);
    image.record([cn, cn, foreign, name]);
    image.record([cn, cn, id, name]);
    image.null_record();
    let space = image.into_space();

    let records = recovery::recover(&space, &RecoveryConfig::default()).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn decoy_marker_occurrences_are_skipped() {
    let mut image = ImageBuilder::new(BASE);
    // earlier copies of the strings that no record points at
    image.string(KOBO_TOUCH);
    image.string(TRILOGY);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    let anchor = image.record([cn, cn, id, name]);
    image.null_record();
    let space = image.into_space();

    let recovery = StructRecovery::new(&space, RecoveryConfig::default()).unwrap();
    let hits = recovery.locate_markers().unwrap();
    assert_eq!(hits.codenames.len(), 2);
    assert_eq!(hits.names.len(), 2);
    assert_eq!(hits.combinations(), 4);
    assert_eq!(recovery.triangulate(&hits).unwrap(), anchor);
    assert_eq!(recovery.run().unwrap().len(), 1);
}

#[test]
fn marker_without_terminating_nul_does_not_count() {
    let mut image = ImageBuilder::new(BASE);
    image.raw(TOUCH_ID.as_bytes());
    image.raw(b"X");
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.record([cn, cn, cn, name]);
    let space = image.into_space();

    let err = recovery::recover(&space, &RecoveryConfig::default()).unwrap_err();
    assert!(
        matches!(err, RecoveryError::MarkerNotFound { marker: "id", .. }),
        "{err}"
    );
}

#[test]
fn id_without_device_prefix_is_not_found() {
    let foreign_id = "12345678-0000-0000-0000-000000000310";
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(foreign_id);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    image.record([cn, cn, id, name]);
    image.null_record();
    let space = image.into_space();

    let err = recovery::recover(&space, &RecoveryConfig::default()).unwrap_err();
    assert!(matches!(err, RecoveryError::MarkerNotFound { marker: "id", .. }));
    assert!(err.to_string().starts_with("recovery failed"));

    // searching for the foreign id finds the record, but it cannot anchor the table
    let config = RecoveryConfig {
        markers: Markers {
            id: foreign_id.to_string(),
            ..Markers::default()
        },
        ..RecoveryConfig::default()
    };
    let err = recovery::recover(&space, &config).unwrap_err();
    assert!(matches!(err, RecoveryError::InvalidAnchor { .. }), "{err}");
    assert!(err.to_string().starts_with("recovery failed"));
}

#[test]
fn strings_without_a_record_yield_anchor_not_found() {
    let mut image = ImageBuilder::new(BASE);
    image.string(TOUCH_ID);
    image.string(TRILOGY);
    image.string(KOBO_TOUCH);
    image.null_record();
    let space = image.into_space();

    let err = recovery::recover(&space, &RecoveryConfig::default()).unwrap_err();
    assert_eq!(err, RecoveryError::AnchorNotFound { candidates: 1 });
}

#[test]
fn dangling_pointer_inside_table_is_corruption() {
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    image.record([cn, cn, id, name]);
    let broken = image.record([cn, 0x7fff_0000, id, name]);
    image.null_record();
    let space = image.into_space();

    match recovery::recover(&space, &RecoveryConfig::default()) {
        Err(RecoveryError::Corrupt { addr, .. }) => assert_eq!(addr, broken),
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn overlong_string_inside_table_is_corruption() {
    let long = "x".repeat(200);
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    let long = image.string(&long);
    image.null_record();
    image.record([cn, cn, id, name]);
    image.record([cn, cn, id, long]);
    image.null_record();
    let space = image.into_space();

    let err = recovery::recover(&space, &RecoveryConfig::default()).unwrap_err();
    assert!(matches!(err, RecoveryError::Corrupt { .. }), "{err}");

    let config = RecoveryConfig {
        max_string_len: 256,
        ..RecoveryConfig::default()
    };
    let records = recovery::recover(&space, &config).unwrap();
    assert_eq!(records[1].name.len(), 200);
}

#[test]
fn sixty_four_bit_big_endian_table() {
    let layout = RecordLayout::new(PointerWidth::Bits64, Endianness::Big, 4);
    let mut image = ImageBuilder::with_layout(0x1_0000_0000, layout);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    image.record([cn, cn, id, name]);
    image.null_record();
    let space = image.into_space();

    let default = recovery::recover(&space, &RecoveryConfig::default());
    assert!(default.is_err());

    let config = RecoveryConfig {
        layout: Some(layout),
        ..RecoveryConfig::default()
    };
    let records = recovery::recover(&space, &config).unwrap();
    assert_eq!(records, vec![device(TRILOGY, TRILOGY, TOUCH_ID, KOBO_TOUCH)]);
}

#[test]
fn invalid_configuration_is_rejected() {
    let space = ImageBuilder::new(BASE).into_space();
    let config = RecoveryConfig {
        layout: Some(RecordLayout::new(PointerWidth::Bits32, Endianness::Little, 3)),
        ..RecoveryConfig::default()
    };
    assert!(matches!(
        StructRecovery::new(&space, config),
        Err(RecoveryError::InvalidConfig(_))
    ));

    let mut config = RecoveryConfig::default();
    config.markers.codename = String::new();
    assert!(matches!(
        recovery::recover(&space, &config),
        Err(RecoveryError::InvalidConfig(_))
    ));
}

#[test]
fn execute_only_text_below_the_table_is_skipped() {
    let mut image = ImageBuilder::new(BASE);
    let id = image.string(TOUCH_ID);
    let cn = image.string(TRILOGY);
    let name = image.string(KOBO_TOUCH);
    image.null_record();
    image.record([cn, cn, id, name]);
    image.null_record();
    let data = image.bytes().to_vec();
    let len = data.len() as u64;

    let space = VirtualAddressSpace::new(
        vec![
            Segment::load(0x1000, 0x1000).with_perms(Perms::EXECUTE),
            Segment::load(BASE, len)
                .with_file_range(0, len)
                .with_perms(Perms::READ | Perms::WRITE),
        ],
        data,
    );

    let records = recovery::recover(&space, &RecoveryConfig::default()).unwrap();
    assert_eq!(records, vec![device(TRILOGY, TRILOGY, TOUCH_ID, KOBO_TOUCH)]);
}
