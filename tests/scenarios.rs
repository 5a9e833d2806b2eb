//! End-to-end scenarios: source text in, final register state out, against
//! the bundled rv32i/rv32m and rv64i/rv64m extension data.

use rv_edu_sim::arch::{Endianness, ExtensionAssembler, ExtensionFormula, JsonExtensionProvider, MemoryValue};
use rv_edu_sim::parser::assemble;
use rv_edu_sim::store::SimulatedStore;

fn store_for(formula: &str, memory_size: usize) -> SimulatedStore {
    let provider = JsonExtensionProvider::bundled();
    let formula = ExtensionFormula::parse(formula, formula);
    let arch = ExtensionAssembler::new(&provider).assemble(&formula).unwrap();
    SimulatedStore::new(&arch, memory_size)
}

fn run(store: &mut SimulatedStore, source: &str, starting_pc: u64) {
    let program = assemble(source, store);
    assert!(program.is_executable(), "unexpected compile errors: {:?}", program.errors.iter().collect::<Vec<_>>());

    let pc_width = store.register_width("pc").unwrap();
    store.put_register("pc", MemoryValue::from_unsigned(starting_pc, pc_width, store.endianness())).unwrap();

    loop {
        let pc = store.get_register("pc").unwrap().to_unsigned(store.endianness()).unwrap();
        let Some(node) = program.instructions.get(&pc) else { break };
        node.get_value(store).unwrap();
    }
}

fn reg(store: &SimulatedStore, name: &str) -> u64 {
    store.get_register(name).unwrap().to_unsigned(store.endianness()).unwrap()
}

#[test]
fn s1_integer_add() {
    let mut store = store_for("rv32i", 1024);
    run(
        &mut store,
        r#"
        addi x1, x0, 41
        addi x2, x0, 1
        add  x3, x1, x2
        "#,
        0,
    );
    assert_eq!(reg(&store, "x1"), 41);
    assert_eq!(reg(&store, "x2"), 1);
    assert_eq!(reg(&store, "x3"), 42);
    assert_eq!(reg(&store, "pc"), 12);
}

#[test]
fn s2_branch_taken() {
    let mut store = store_for("rv32i", 1024);
    store.put_register("x1", MemoryValue::from_unsigned(5, 32, store.endianness())).unwrap();
    store.put_register("x2", MemoryValue::from_unsigned(5, 32, store.endianness())).unwrap();
    run(
        &mut store,
        r#"
        beq x1, x2, 4
        addi x3, x0, 1
        addi x3, x0, 2
        "#,
        0,
    );
    assert_eq!(reg(&store, "x3"), 2);
    assert_eq!(reg(&store, "pc"), 12);
}

#[test]
fn s3_branch_not_taken() {
    let mut store = store_for("rv32i", 1024);
    store.put_register("x1", MemoryValue::from_unsigned(5, 32, store.endianness())).unwrap();
    store.put_register("x2", MemoryValue::from_unsigned(6, 32, store.endianness())).unwrap();
    run(
        &mut store,
        r#"
        beq x1, x2, 4
        addi x3, x0, 1
        addi x3, x0, 2
        "#,
        0,
    );
    assert_eq!(reg(&store, "x3"), 2);
    assert_eq!(reg(&store, "pc"), 12);
}

#[test]
fn s4_jal_linkage() {
    let mut store = store_for("rv32i", 1024);
    run(&mut store, "jal x1, 10\n", 100);
    assert_eq!(reg(&store, "x1"), 104);
    assert_eq!(reg(&store, "pc"), 120);
}

#[test]
fn s5_load_store_round_trip() {
    let mut store = store_for("rv32i", 1024);
    run(
        &mut store,
        r#"
        addi x1, x0, 0xA5
        sb   x1, x0, 16
        lbu  x2, x0, 16
        "#,
        0,
    );
    assert_eq!(reg(&store, "x2"), 0xA5);
}

#[test]
fn s6_lui_sign_extension_on_64_bit_architecture() {
    let mut store = store_for("rv64i", 1024);
    run(&mut store, "lui x1, 0x81234\n", 0);
    assert_eq!(reg(&store, "x1"), 0xFFFF_FFFF_8123_4000);
}

#[test]
fn backward_branch_loop_runs_to_completion() {
    // offsets are literal, counted in multiples of two bytes
    // 4.4) — not computed from a label, so the loop branch back to `loop:`
    // (4 bytes behind the `bne` at pc=8) is written as offset -2.
    let mut store = store_for("rv32i", 1024);
    run(
        &mut store,
        r#"
        addi x1, x0, 3
    loop:
        addi x1, x1, -1
        bne  x1, x0, -2
        addi x2, x0, 99
        "#,
        0,
    );
    assert_eq!(reg(&store, "x1"), 0);
    assert_eq!(reg(&store, "x2"), 99);
}

#[test]
fn macro_and_equ_constant_combine_end_to_end() {
    let mut store = store_for("rv32i", 1024);
    run(
        &mut store,
        r#"
        .equ STEP, 2
        .macro BUMP, REG
            addi REG, REG, STEP
        .endm
        BUMP x1
        BUMP x1
        "#,
        0,
    );
    assert_eq!(reg(&store, "x1"), 4);
}

#[test]
fn data_section_word_is_loadable_by_address() {
    let mut store = store_for("rv32i", 1024);
    run(
        &mut store,
        r#"
        .section data
    value:
        .word 0x1234
        .section text
        lui  x1, 0
        addi x2, x0, value
        lw   x3, x2, 0
        "#,
        0,
    );
    assert_eq!(reg(&store, "x3"), 0x1234);
}

#[test]
fn multiply_and_divide_extension_semantics() {
    let mut store = store_for("rv32i,rv32m", 1024);
    run(
        &mut store,
        r#"
        addi x1, x0, 6
        addi x2, x0, 7
        mul  x3, x1, x2
        addi x4, x0, 0
        div  x5, x1, x4
        "#,
        0,
    );
    assert_eq!(reg(&store, "x3"), 42);
    assert_eq!(reg(&store, "x5") as u32 as i32, -1);
}
