mod common;
use common::*;

fn cycle(raw: &[bytes::Bytes], registry: &mut Registry, ctx: &mut DecoderContext) -> Vec<Reading> {
    let batch: Vec<Message> = raw
        .iter()
        .map(|bytes| packet::parse(bytes.clone(), ctx).unwrap())
        .collect();
    registry.update(&batch, ctx);
    registry.snapshot(&batch).unwrap()
}

fn remote_data(readings: &[Reading]) -> &serde_json::Value {
    &readings
        .iter()
        .find(|r| r.item == "REMOTE")
        .expect("no REMOTE reading")
        .data
}

#[test]
fn companion_blocks_are_pruned_without_companions() {
    common_setup();
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    let readings = cycle(&[Factory::remote_ags_soc()], &mut registry, &mut ctx);
    let data = remote_data(&readings);

    // base settings always survive
    assert!(data.get("searchwatts").is_some());
    assert!(data.get("absorbtime").is_some());

    // no AGS, BMK or PT-100 in the batch: their settings blocks go
    assert!(data.get("socstart").is_none());
    assert!(data.get("genstart").is_none());
    assert!(data.get("batteryefficiency").is_none());
    assert!(data.get("AbsorbVoltage").is_none());
    assert!(data.get("lognumber").is_none());
}

#[test]
fn companion_blocks_survive_with_companions_present() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    let readings = cycle(
        &[
            Factory::remote_ags_soc(),
            Factory::ags_status(),
            Factory::bmk_status(),
            Factory::pt_status(),
        ],
        &mut registry,
        &mut ctx,
    );
    let data = remote_data(&readings);

    assert!(data.get("socstart").is_some());
    assert!(data.get("batteryefficiency").is_some());
    assert!(data.get("relayonvdc").is_some());
}

#[test]
fn pruning_follows_the_current_batch() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    // first cycle sees the AGS, second does not (generator powered off)
    let readings = cycle(
        &[Factory::remote_ags_soc(), Factory::ags_status()],
        &mut registry,
        &mut ctx,
    );
    assert!(remote_data(&readings).get("socstart").is_some());

    let readings = cycle(&[Factory::remote_ags_soc()], &mut registry, &mut ctx);
    assert!(remote_data(&readings).get("socstart").is_none());
}

#[test]
fn msh_fields_never_appear() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    let readings = cycle(
        &[
            Factory::remote_ags_soc(),
            Factory::ags_status(),
            Factory::bmk_status(),
            Factory::pt_status(),
        ],
        &mut registry,
        &mut ctx,
    );
    let data = remote_data(&readings);

    assert!(data.get("mshinputamps").is_none());
    assert!(data.get("mshcutoutvoltage").is_none());
}

#[test]
fn snapshot_is_ordered_and_cumulative() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    cycle(&[Factory::inverter()], &mut registry, &mut ctx);
    let readings = cycle(&[Factory::bmk_status()], &mut registry, &mut ctx);

    // the inverter from the previous cycle is still reported, first
    let items: Vec<&str> = readings.iter().map(|r| r.item.as_str()).collect();
    assert_eq!(items, vec!["INVERTER", "BMK"]);
}

#[test]
fn trace_stores_uppercase_hex_keyed_by_packet_label() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(true);

    let readings = cycle(
        &[Factory::remote_ags_soc(), Factory::ags_status()],
        &mut registry,
        &mut ctx,
    );

    let remote = remote_data(&readings);
    let expected = Factory::remote_ags_soc()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<String>();
    assert_eq!(remote["REMOTE_A2"], expected);

    let ags = &readings
        .iter()
        .find(|r| r.item == "AGS")
        .expect("no AGS reading")
        .data;
    assert!(ags.get("AGS_A1").is_some());
}

#[test]
fn trace_disabled_leaves_no_extra_keys() {
    let mut ctx = DecoderContext::new();
    let mut registry = Registry::new(false);

    let readings = cycle(&[Factory::ags_status()], &mut registry, &mut ctx);
    let ags = &readings
        .iter()
        .find(|r| r.item == "AGS")
        .expect("no AGS reading")
        .data;
    assert!(ags.get("AGS_A1").is_none());
}
