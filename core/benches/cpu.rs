// SPDX-License-Identifier: MPL-2.0

use criterion::{criterion_group, criterion_main, Criterion};

/// A BIOS that counts up forever: `addiu r8, r8, 1; j 0xbfc00000; nop`.
fn spin_bios() -> Vec<u8> {
    [0x2508_0001u32, 0x0bf0_0000, 0x0000_0000]
        .iter()
        .flat_map(|it| it.to_le_bytes())
        .collect()
}

fn execute_next_instr(c: &mut Criterion) {
    let mut core = r3k::Core::default();
    core.load_bios(&spin_bios()).unwrap();
    let mut cpu = core.cpu();

    c.bench_function("cpu::execute_next_instr", |b| {
        b.iter(|| cpu.execute_next_instr())
    });
}

fn execute_run_cached(c: &mut Criterion) {
    let mut core = r3k::Core::default();
    core.load_bios(&spin_bios()).unwrap();
    core.cpu_state_mut().cache.set_biu(0x0001_e988);
    // Run from kseg0 so that fetches hit the I-cache.
    *core.cpu_state_mut().reg.pc_mut() = 0x9fc0_0000;

    c.bench_function("cpu::execute_run(cached, 10_000)", |b| {
        b.iter(|| core.run(10_000))
    });
}

criterion_group!(benches, execute_next_instr, execute_run_cached);
criterion_main!(benches);
