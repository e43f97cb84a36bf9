use emu::cpu::cop0::{COP0_CAUSE, COP0_EPC, EXCEPTION_VECTOR};
use emu::cpu::exception::Fault;
use emu::cpu::r4300::{CpuState, RESET_VECTOR};
use emu::rom::LoadError;
use emu::{EmuConfig, N64};
use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng};

/// 1 MiB of RDRAM and a short frame so tests stay fast.
fn config() -> EmuConfig {
    EmuConfig {
        cpu_clock_hz: 262 * 100 * 60,
        rdram_size: 0x10_0000,
        rom_window_size: 0x10_0000,
        ..EmuConfig::default()
    }
}

/// A z64 image whose boot code (at the reset vector) is `program`.
fn image(program: &[u32]) -> Vec<u8> {
    let mut image = vec![0; 0x2000];
    image[0..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
    image[0x20..0x34].copy_from_slice(b"EMU64 TEST          ");
    for (i, word) in program.iter().enumerate() {
        let offset = 0x40 + i * 4;
        image[offset..offset + 4].copy_from_slice(&word.to_be_bytes());
    }
    image
}

fn console(program: &[u32]) -> N64 {
    let mut n64 = N64::new(config()).unwrap();
    n64.load_image(&image(program)).unwrap();
    n64.reset();
    n64.start();
    n64
}

const NOP: u32 = 0x0000_0000;

/// Draws a 5551 gradient at RDRAM 0x1000, points the VI at it, then spins.
fn drawing_program() -> Vec<u32> {
    vec![
        0x3C08_A000, // lui t0, 0xA000          ; t0 = RDRAM (kseg1)
        0x3508_1000, // ori t0, t0, 0x1000
        0x2409_0000, // addiu t1, zero, 0       ; pixel counter
        0x240A_0500, // addiu t2, zero, 0x500   ; pixel count
        // loop:
        0x0009_5840, // sll t3, t1, 1
        0x010B_6021, // addu t4, t0, t3
        0x392D_FFFF, // xori t5, t1, 0xFFFF
        0xA58D_0000, // sh t5, 0(t4)
        0x2529_0001, // addiu t1, t1, 1
        0x152A_FFFA, // bne t1, t2, loop
        NOP,
        0x3C0E_A440, // lui t6, 0xA440          ; VI
        0x240F_0002, // addiu t7, zero, 2       ; RGBA5551
        0xADCF_0000, // sw t7, 0(t6)            ; VI_STATUS
        0xADC8_0004, // sw t0, 4(t6)            ; VI_ORIGIN
        0x240F_0140, // addiu t7, zero, 320
        0xADCF_0008, // sw t7, 8(t6)            ; VI_WIDTH
        // spin:
        0x1000_FFFF, // beq zero, zero, spin
        NOP,
    ]
}

#[test]
fn load_empty_image_fails_and_keeps_state() {
    let mut n64 = console(&[NOP]);
    n64.run_frame();
    let pc = n64.cpu.pc;

    assert_eq!(n64.load_image(&[]), Err(LoadError::Empty));
    assert_eq!(n64.cpu.pc, pc);
    assert_eq!(n64.header().unwrap().image_name(), "EMU64 TEST");
}

#[test]
fn load_oversized_image_fails() {
    let mut n64 = N64::new(config()).unwrap();
    let image = vec![0xFF; 0x10_0000 + 4];

    assert_eq!(
        n64.load_image(&image),
        Err(LoadError::TooLarge {
            size: 0x10_0004,
            max: 0x10_0000
        })
    );
    assert!(n64.header().is_none());
}

#[test]
fn reset_enters_boot_code() {
    let mut n64 = console(&[0x2408_0001]); // addiu t0, zero, 1
    assert_eq!(n64.cpu.pc, RESET_VECTOR);

    n64.cpu.step();

    assert_eq!(n64.cpu.registers.register_at(8), 1);
    assert_eq!(n64.state(), CpuState::Running);
}

#[test]
fn frames_are_deterministic() {
    let run = || {
        let mut n64 = console(&drawing_program());
        let mut frames = Vec::new();
        for frame in 0..4_u16 {
            n64.set_input_state(frame);
            frames.push(n64.run_frame().framebuffer);
        }
        (frames, n64.cpu.cycles, n64.cpu.pc)
    };

    let (frames_a, cycles_a, pc_a) = run();
    let (frames_b, cycles_b, pc_b) = run();

    assert_eq!(cycles_a, cycles_b);
    assert_eq!(pc_a, pc_b);
    assert_eq!(frames_a, frames_b);
}

#[test]
fn program_draws_through_the_vi() {
    let mut n64 = console(&drawing_program());

    let result = n64.run_frame();

    assert!(!result.faulted());
    let framebuffer = n64.framebuffer();
    // Pixel 0 is 0xFFFF (white), pixel 1 is 0xFFFE (white, no coverage).
    assert_eq!(framebuffer[(0, 0)], 0xFFFF_FFFF);
    assert_eq!(framebuffer[(1, 0)], 0xFFFF_FF00);
    // Past the drawn pixels RDRAM is zero.
    assert_eq!(framebuffer[(0, 10)], 0x0000_0000);
}

#[test]
fn branch_delay_slot_executes_once() {
    let mut n64 = console(&[
        0x1000_0002, // beq zero, zero, +8
        0x2508_0001, // addiu t0, t0, 1 (delay slot)
        0x2508_0010, // addiu t0, t0, 16 (skipped)
        0x2508_0100, // addiu t0, t0, 256 (target)
    ]);

    for _ in 0..3 {
        n64.cpu.step();
    }

    assert_eq!(n64.cpu.registers.register_at(8), 0x101);
}

#[test]
fn byte_loads_extend_correctly() {
    let mut n64 = console(&[
        0x3C04_A000, // lui a0, 0xA000
        0x2405_00FF, // addiu a1, zero, 0xFF
        0xA085_0010, // sb a1, 16(a0)
        0x8086_0010, // lb a2, 16(a0)
        0x9087_0010, // lbu a3, 16(a0)
    ]);

    for _ in 0..5 {
        n64.cpu.step();
    }

    assert_eq!(n64.cpu.registers.register_at(6), u64::MAX);
    assert_eq!(n64.cpu.registers.register_at(7), 0xFF);
}

#[test]
fn overflow_redirects_to_the_vector_without_commit() {
    let mut n64 = console(&[
        0x3C08_7FFF, // lui t0, 0x7FFF
        0x3508_FFFF, // ori t0, t0, 0xFFFF
        0x2109_0001, // addi t1, t0, 1
    ]);
    n64.cpu.step();
    n64.cpu.step();

    let result = n64.cpu.step();

    assert_eq!(result.fault, Some(Fault::ArithmeticOverflow));
    assert_eq!(n64.cpu.pc, EXCEPTION_VECTOR);
    assert_eq!(n64.cpu.registers.register_at(9), 0);
    assert_eq!(n64.cpu.cop0.read(COP0_EPC), RESET_VECTOR + 8);
    assert_eq!((n64.cpu.cop0.read(COP0_CAUSE) >> 2) & 0x1F, 12);
}

#[test]
fn register_zero_stays_zero() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(64);
    // Random immediate ALU operations, all targeting r0.
    let program: Vec<u32> = (0..256)
        .map(|_| {
            let op: u32 = [0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F][rng.gen_range(0..8)];
            (op << 26) | (rng.gen_range(0..32) << 21) | rng.gen_range(0..=0xFFFF)
        })
        .collect();
    let mut n64 = console(&program);

    for _ in 0..program.len() {
        n64.cpu.step();
        assert_eq!(n64.cpu.registers.register_at(0), 0);
    }
}

#[test]
fn save_state_round_trip() {
    let mut n64 = console(&drawing_program());
    n64.run_frame();
    let saved = n64.save_state().unwrap();
    let cycles = n64.cpu.cycles;
    let framebuffer = n64.framebuffer();

    n64.run_frame();
    n64.cpu.bus.write_word(0x1000, 0);
    n64.load_state(&saved).unwrap();

    assert_eq!(n64.cpu.cycles, cycles);
    assert_eq!(n64.frame(), 1);
    assert_eq!(n64.framebuffer(), framebuffer);

    // Replaying from the snapshot matches a straight run.
    let mut straight = console(&drawing_program());
    straight.run_frame();
    straight.run_frame();
    n64.run_frame();
    assert_eq!(n64.cpu.pc, straight.cpu.pc);
    assert_eq!(n64.framebuffer(), straight.framebuffer());
}

#[test]
fn halted_console_does_not_advance() {
    let mut n64 = console(&[NOP]);
    n64.stop();

    let result = n64.run_frame();

    assert_eq!(result.cycles, 0);
    assert_eq!(result.state, CpuState::Halted);

    n64.start();
    assert_eq!(n64.state(), CpuState::Halted);
    n64.reset();
    assert_eq!(n64.state(), CpuState::Running);
}
