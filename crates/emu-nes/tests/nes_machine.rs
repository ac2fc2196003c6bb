//! Whole-machine tests: the NES definition wired through emu-core.

use emu_core::{BusError, InitError, LineKey, Machine, MachineDefinition, Observable, Ticks, Value};
use emu_nes::map::{CPU_BUS, PPU_BUS};
use emu_nes::{NesConfig, NesDefinition, NesRegion, build, build_ines};
use proptest::prelude::*;

/// 32K NROM image whose reset vector points at `$8000`.
fn rom() -> Vec<u8> {
    let mut prg = vec![0xEA; 32 * 1024];
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;
    build_ines(&prg, &[0; 8 * 1024], 0)
}

fn nes() -> Machine {
    NesDefinition::default().init(&rom()).unwrap()
}

fn cpu_cycles(m: &mut Machine, cycles: u64) {
    for _ in 0..cycles * 12 {
        m.step();
    }
}

fn query(m: &Machine, path: &str) -> Option<Value> {
    m.query(path)
}

fn counter(m: &Machine, path: &str) -> u64 {
    match m.query(path) {
        Some(Value::U64(n)) => n,
        other => panic!("{path}: {other:?}"),
    }
}

#[test]
fn wram_write_reads_back_through_mirror() {
    let mut m = nes();
    m.write(CPU_BUS, 0x0000, 0x42).unwrap();
    assert_eq!(m.read(CPU_BUS, 0x1800).unwrap(), 0x42);
    assert_eq!(m.primary_ram().unwrap().len(), 2048);
    assert_eq!(m.primary_ram().unwrap()[0], 0x42);
}

#[test]
fn reset_preserves_wram_and_refetches_vector() {
    let mut m = nes();
    m.write(CPU_BUS, 0x0123, 0x99).unwrap();
    cpu_cycles(&mut m, 10);
    m.reset();
    assert_eq!(m.read(CPU_BUS, 0x0123).unwrap(), 0x99);
    assert_eq!(m.elapsed(), Ticks::ZERO);
    cpu_cycles(&mut m, 1);
    assert_eq!(
        query(&m, "device.rp2a03.reset_vector"),
        Some(Value::U16(0x8000))
    );
    assert_eq!(query(&m, "device.rp2a03.core.pc"), Some(Value::U16(0x8000)));
}

#[test]
fn port_4017_splits_by_direction() {
    let mut m = nes();
    let entries = m.memory_map();
    let at_4017: Vec<_> = entries
        .iter()
        .filter(|e| e.range.bus == CPU_BUS && e.range.contains(0x4017))
        .map(|e| e.owner.as_str())
        .collect();
    assert_eq!(at_4017.len(), 2);
    assert!(at_4017.contains(&"apu"));
    assert!(at_4017.contains(&"nes_controller"));

    // Writing $4017 reaches the APU frame counter
    m.write(CPU_BUS, 0x4017, 0x80).unwrap();
    assert_eq!(query(&m, "device.apu.five_step"), Some(Value::Bool(true)));
    // Reading it reaches controller port 2
    m.read(CPU_BUS, 0x4017).unwrap();
    assert_eq!(
        query(&m, "device.nes_controller.port2.shift"),
        Some(Value::U8(0x80))
    );
}

#[test]
fn frame_timing_matches_the_crystal() {
    let mut m = nes();
    assert!(m.run_frame(Ticks(400_000)));
    assert_eq!(m.elapsed(), Ticks(357_368));
    assert!(m.run_frame(Ticks(400_000)));
    assert_eq!(m.frame_count(), 2);
    assert_eq!(
        query(&m, "clock.rp2a03.clk"),
        Some(Value::U64(2 * 357_368 / 12))
    );

    let mut pal = build(&NesConfig {
        rom_data: rom(),
        region: NesRegion::Pal,
    })
    .unwrap();
    assert!(pal.run_frame(Ticks(600_000)));
    assert_eq!(pal.elapsed(), Ticks(531_960));
}

#[test]
fn vblank_nmi_reaches_the_cpu_once_per_frame() {
    let mut m = nes();
    m.write(CPU_BUS, 0x2000, 0x80).unwrap();
    m.run_frame(Ticks(400_000));
    assert_eq!(query(&m, "device.rp2a03.core.nmis"), Some(Value::U64(1)));
    m.run_frame(Ticks(400_000));
    m.run_frame(Ticks(400_000));
    assert_eq!(query(&m, "device.rp2a03.core.nmis"), Some(Value::U64(3)));

    let nmi = m.line_state(&LineKey::new("nmi", 0)).unwrap();
    assert_eq!(nmi.rising, 3);
    assert_eq!(m.router().listeners(&LineKey::new("nmi", 0)).len(), 1);
}

#[test]
fn apu_frame_irq_is_level_sampled_by_the_cpu() {
    let mut m = nes();
    // Four sequencer steps; the interrupt is raised on the last one
    for _ in 0..4 * 89_490 {
        m.step();
    }
    assert_eq!(query(&m, "irq.irq.1"), Some(Value::Bool(true)));
    let before = counter(&m, "device.rp2a03.core.irq_cycles");
    cpu_cycles(&mut m, 10);
    assert_eq!(counter(&m, "device.rp2a03.core.irq_cycles"), before + 10);

    // Acknowledge through $4015
    m.read(CPU_BUS, 0x4015).unwrap();
    assert_eq!(query(&m, "irq.irq.1"), Some(Value::Bool(false)));
    cpu_cycles(&mut m, 10);
    assert_eq!(counter(&m, "device.rp2a03.core.irq_cycles"), before + 10);
}

#[test]
fn sprite_dma_halts_the_cpu() {
    let mut m = nes();
    cpu_cycles(&mut m, 1);
    for i in 0..256 {
        m.write(CPU_BUS, 0x0300 + i, i as u8).unwrap();
    }
    m.write(CPU_BUS, 0x4014, 0x03).unwrap();
    cpu_cycles(&mut m, 512);
    assert_eq!(
        query(&m, "device.rp2a03.halted_cycles"),
        Some(Value::U64(511))
    );
    assert_eq!(query(&m, "device.ppu.oam.200"), Some(Value::U8(200)));
    assert_eq!(query(&m, "irq.rdy.2"), Some(Value::Bool(false)));
}

#[test]
fn ppu_bus_is_independent_of_cpu_bus() {
    let mut m = nes();
    m.write(PPU_BUS, 0x0000, 0x11).unwrap();
    m.write(CPU_BUS, 0x0000, 0x22).unwrap();
    assert_eq!(
        m.read(PPU_BUS, 0x0000).unwrap(),
        0x00,
        "CHR ROM ignores writes"
    );
    assert_eq!(m.read(CPU_BUS, 0x0000).unwrap(), 0x22);
}

#[test]
fn unmapped_accesses_are_typed_errors() {
    let mut m = nes();
    assert!(matches!(
        m.read(PPU_BUS, 0x4000),
        Err(BusError::Unmapped(_))
    ));
}

#[test]
fn av_info_comes_from_devices() {
    let m = nes();
    let video = m.video().unwrap();
    assert_eq!((video.width, video.height), (256, 240));
    assert!((video.fps - 60.0988).abs() < 0.001);
    assert_eq!(m.audio().unwrap().sample_rate, 48_000.0);
}

#[test]
fn bad_content_is_rejected_without_a_machine() {
    let err = NesDefinition::default().init(b"not a rom").err().unwrap();
    assert!(matches!(err, InitError::Rejected { .. }));

    let mut mapper1 = rom();
    mapper1[6] = 0x10;
    let err = NesDefinition::default().init(&mapper1).err().unwrap();
    assert!(err.to_string().contains("unsupported mapper 1"));
}

#[test]
fn controller_input_reaches_the_machine() {
    let definition = NesDefinition::default();
    let mut m = definition.init(&rom()).unwrap();
    definition
        .input()
        .set_button(0, emu_nes::button::START, true);
    m.write(CPU_BUS, 0x4016, 1).unwrap();
    m.write(CPU_BUS, 0x4016, 0).unwrap();
    let bits: Vec<u8> = (0..4)
        .map(|_| m.read(CPU_BUS, 0x4016).unwrap() & 1)
        .collect();
    assert_eq!(bits, vec![0, 0, 0, 1]);
}

proptest! {
    #[test]
    fn wram_mirrors_agree(offset in 0u32..0x800, copy in 0u32..4, value: u8) {
        let mut m = nes();
        m.write(CPU_BUS, offset + copy * 0x800, value).unwrap();
        for mirror in 0..4 {
            prop_assert_eq!(m.read(CPU_BUS, offset + mirror * 0x800).unwrap(), value);
        }
    }
}
