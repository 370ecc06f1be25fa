//! End-to-end tests of the peripherals as seen from the machine: the
//! timers, the interrupt plumbing into the CPU, DMA into the graphics
//! front-end and a full disc read pulled over the CD-ROM DMA channel.

mod util;

use std::fs::File;
use std::io::Write;

use util::machine::{asm, idle_machine, machine, run};

const IRQ_STATUS: u32 = 0x1F80_1070;
const IRQ_MASK: u32 = 0x1F80_1074;

const TIMER2_COUNTER: u32 = 0x1F80_1120;
const TIMER2_MODE: u32 = 0x1F80_1124;
const TIMER2_TARGET: u32 = 0x1F80_1128;

#[test]
fn timer2_target_interrupt() {
    let mut psx = idle_machine();

    // clock source sysclock/8, interrupt on target
    psx.cpu.bus.store32(TIMER2_TARGET, 100);
    psx.cpu.bus.store32(TIMER2_MODE, (2 << 8) | 0x10);

    // 800 CPU cycles = 100 timer ticks
    run(&mut psx, 800);

    assert_eq!(
        psx.cpu.bus.load32(IRQ_STATUS) & (1 << 6),
        1 << 6,
        "timer 2 line pending"
    );
    let mode = psx.cpu.bus.load32(TIMER2_MODE);
    assert_ne!(mode & (1 << 10), 0, "interrupt request bit");
    assert_ne!(mode & (1 << 11), 0, "reached-target sticky bit");

    // a mode write acknowledges everything
    psx.cpu.bus.store32(TIMER2_MODE, (2 << 8) | 0x10);
    assert_eq!(psx.cpu.bus.load32(IRQ_STATUS) & (1 << 6), 0);
    let mode = psx.cpu.bus.load32(TIMER2_MODE);
    assert_eq!(mode & (1 << 10), 0);
    assert_eq!(mode & (1 << 11), 0);
}

#[test]
fn timer2_counts_the_machine_clock() {
    let mut psx = idle_machine();

    run(&mut psx, 123);
    assert_eq!(psx.cpu.bus.load32(TIMER2_COUNTER), 123);
}

#[test]
fn vblank_fires_once_per_frame() {
    let mut psx = idle_machine();

    psx.run_frame();

    assert_eq!(psx.frames(), 1);
    assert_eq!(
        psx.cpu.bus.load32(IRQ_STATUS) & 1,
        1,
        "VBlank line pending after a frame"
    );
}

#[test]
fn enabled_interrupt_reaches_the_cpu() {
    let mut psx = machine(&[
        asm::addiu(9, 0, 1),
        asm::mtc0(9, 12), // status bit 0: interrupt enable
        asm::nop(),
        asm::nop(),
    ]);

    run(&mut psx, 2);

    psx.cpu.bus.store32(IRQ_MASK, 0x7FF);
    psx.cpu.bus.request_irq(waystation_core::devices::irq::Interrupt::VBlank);

    psx.step();

    assert_eq!(psx.cpu.pc(), 0x8000_0080, "interrupt vectors to the handler");
    assert_eq!((psx.cpu.cause() >> 2) & 0x1F, 0, "cause code 0");
    assert_ne!(psx.cpu.cause() & (1 << 10), 0, "hardware line mirrored");
}

#[test]
fn masked_interrupt_is_ignored() {
    let mut psx = machine(&[
        asm::addiu(9, 0, 1),
        asm::mtc0(9, 12),
        asm::nop(),
        asm::nop(),
        asm::nop(),
    ]);

    run(&mut psx, 2);

    psx.cpu.bus.request_irq(waystation_core::devices::irq::Interrupt::VBlank);
    psx.step();

    assert_ne!(psx.cpu.pc(), 0x8000_0080, "masked line must not interrupt");
}

#[test]
fn linked_list_dma_runs_one_packet() {
    let mut psx = idle_machine();

    // one no-op packet, then a terminator with bit 23 set
    psx.cpu.bus.store32(0x100, (1 << 24) | 0x200);
    psx.cpu.bus.store32(0x104, 0x0000_0000);
    psx.cpu.bus.store32(0x200, 0x0080_0000);

    psx.cpu.bus.store32(0x1F80_10A0, 0x100);
    psx.cpu.bus.store32(0x1F80_10A8, 0x0100_0401);

    assert_eq!(psx.cpu.bus.gpu.fifo_len(), 0, "no-op consumed");
    assert_eq!(
        psx.cpu.bus.load32(0x1F80_10A8) & (1 << 24),
        0,
        "channel 2 inactive after the drain"
    );
}

#[test]
fn image_upload_round_trips_through_the_bus() {
    let mut psx = idle_machine();
    const GP0: u32 = 0x1F80_1810;

    // upload one pixel pair at (0, 0)
    psx.cpu.bus.store32(GP0, 0xA000_0000);
    psx.cpu.bus.store32(GP0, 0x0000_0000);
    psx.cpu.bus.store32(GP0, 0x0001_0002);
    psx.cpu.bus.store32(GP0, 0x7C1F_03E0);

    // read it back
    psx.cpu.bus.store32(GP0, 0xC000_0000);
    psx.cpu.bus.store32(GP0, 0x0000_0000);
    psx.cpu.bus.store32(GP0, 0x0001_0002);

    assert_eq!(psx.cpu.bus.load32(GP0), 0x7C1F_03E0);
}

/// Build a minimal ISO image with a valid primary volume descriptor
fn synthetic_iso_path(name: &str) -> std::path::PathBuf {
    let mut image = vec![0u8; 20 * 2048];

    let pvd = 16 * 2048;
    image[pvd] = 1;
    image[pvd + 1..pvd + 6].copy_from_slice(b"CD001");
    image[pvd + 40..pvd + 48].copy_from_slice(b"TESTDISC");

    // root directory record pointing at an empty extent
    let root = &mut image[pvd + 156..pvd + 190];
    root[0] = 34;
    root[2..6].copy_from_slice(&18u32.to_le_bytes());
    root[10..14].copy_from_slice(&2048u32.to_le_bytes());
    root[25] = 0x02;
    root[32] = 1;

    let mut path = std::env::temp_dir();
    path.push(format!("waystation-e2e-{}-{}", std::process::id(), name));
    let mut file = File::create(&path).expect("could not create test image");
    file.write_all(&image).expect("could not write test image");
    path
}

#[test]
fn executable_sideloads_at_the_shell_entry() {
    // the boot program jumps straight to the shell entry point
    let mut psx = machine(&[asm::lui(8, 0x8003), asm::jr(8), asm::nop()]);

    // a program that loads 42 into $t1 and spins
    let words = [asm::addiu(9, 0, 42), asm::j(0x8001_0004), asm::nop()];
    let text: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();

    let mut image = vec![0u8; 0x800 + text.len()];
    image[0..8].copy_from_slice(b"PS-X EXE");
    image[0x10..0x14].copy_from_slice(&0x8001_0000u32.to_le_bytes());
    image[0x14..0x18].copy_from_slice(&0x8000_1234u32.to_le_bytes());
    image[0x18..0x1C].copy_from_slice(&0x8001_0000u32.to_le_bytes());
    image[0x1C..0x20].copy_from_slice(&(text.len() as u32).to_le_bytes());
    image[0x30..0x34].copy_from_slice(&0x801F_FF00u32.to_le_bytes());
    image[0x800..].copy_from_slice(&text);

    let mut path = std::env::temp_dir();
    path.push(format!("waystation-e2e-{}-sideload.exe", std::process::id()));
    let mut file = File::create(&path).expect("could not create test executable");
    file.write_all(&image).expect("could not write test executable");

    psx.sideload_exe(&path).expect("executable must parse");

    // lui, jr, delay slot, then the injected first instruction
    run(&mut psx, 4);

    assert_eq!(psx.cpu.reg(9), 42, "side-loaded code must run");
    assert_eq!(psx.cpu.reg(28), 0x8000_1234, "global pointer loaded");
    assert_eq!(psx.cpu.reg(29), 0x801F_FF00, "stack pointer loaded");

    std::fs::remove_file(path).ok();
}

#[test]
fn disc_sector_arrives_in_ram_over_dma() {
    let mut psx = idle_machine();
    let path = synthetic_iso_path("dma.iso");
    psx.insert_disc(&path).expect("disc must open");

    const CD_PORT0: u32 = 0x1F80_1800;
    const CD_PORT1: u32 = 0x1F80_1801;
    const CD_PORT2: u32 = 0x1F80_1802;
    const CD_PORT3: u32 = 0x1F80_1803;

    // SetLoc 00:02:16 -> block 16, where the volume descriptor lives
    psx.cpu.bus.store8(CD_PORT2, 0x00);
    psx.cpu.bus.store8(CD_PORT2, 0x02);
    psx.cpu.bus.store8(CD_PORT2, 0x16);
    psx.cpu.bus.store8(CD_PORT1, 0x02);

    // ReadN
    psx.cpu.bus.store8(CD_PORT1, 0x06);

    // spin until the drive signals data ready (INT1)
    let mut guard = 0;
    loop {
        psx.step();
        psx.cpu.bus.store8(CD_PORT0, 1);
        let flags = psx.cpu.bus.load8(CD_PORT3) & 0x1F;
        psx.cpu.bus.store8(CD_PORT0, 0);
        if flags & 0x01 != 0 {
            break;
        }

        guard += 1;
        assert!(guard < 1_000_000, "sector never became ready");
    }

    // pull 512 words into RAM at 0x2000 over channel 3
    psx.cpu.bus.store32(0x1F80_10B0, 0x2000);
    psx.cpu.bus.store32(0x1F80_10B4, 512);
    psx.cpu.bus.store32(0x1F80_10B8, 0x1100_0000);

    assert_eq!(psx.cpu.bus.load8(0x2000), 1, "descriptor type byte");
    assert_eq!(psx.cpu.bus.load8(0x2001), b'C');
    assert_eq!(psx.cpu.bus.load8(0x2002), b'D');
    assert_eq!(psx.cpu.bus.load8(0x2005), b'1');

    std::fs::remove_file(path).ok();
}
