//! `LineNumberTable` and `LocalVariableTable` contents for lowered methods.

use tree2class::code::MethodCode;
use tree2class::jvm::{
    BootstrapMethodsTable, ConstantIndex, ConstantPool, FieldType, LineNumberEntry,
    LocalVariableEntry, MethodAccessFlags, MethodDescriptor, Utf8Index,
};
use tree2class::tree::{
    BinOp, Const, Expr, FinallyStrategy, MethodSpec, Statement, StatementKind,
};

fn compile(parameters: Vec<FieldType>, body: Vec<Statement>) -> MethodCode {
    let _ = env_logger::builder().is_test(true).try_init();
    let spec = MethodSpec {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name: "test".to_owned(),
        descriptor: MethodDescriptor::new(parameters, None),
        body,
        finally_strategy: FinallyStrategy::Duplicate,
    };
    let mut pool = ConstantPool::new();
    let mut bootstrap = BootstrapMethodsTable::new();
    tree2class::lower::compile_method(&spec, &mut pool, &mut bootstrap).unwrap()
}

fn int(value: i32) -> Expr {
    Expr::Const(Const::Int(value))
}

fn declare_j(line: u16, init: Expr) -> Statement {
    Statement::at_line(
        line,
        StatementKind::Declare {
            slot: 1,
            name: "j".to_owned(),
            ty: FieldType::INT,
            init: Some(init),
        },
    )
}

fn assign_j(line: u16, value: Expr) -> Statement {
    Statement::at_line(
        line,
        StatementKind::Expr(Expr::Assign {
            slot: 1,
            ty: FieldType::INT,
            value: Box::new(value),
        }),
    )
}

#[test]
fn statements_map_to_line_rows() {
    // line 1: int j = i + 1;
    // line 2: return;
    let body = vec![
        declare_j(
            1,
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Local {
                    slot: 0,
                    ty: FieldType::INT,
                }),
                rhs: Box::new(int(1)),
            },
        ),
        Statement::at_line(2, StatementKind::Return(None)),
    ];
    let method = compile(vec![FieldType::INT], body);

    assert_eq!(method.code, vec![0x1a, 0x04, 0x60, 0x3c, 0xb1]);
    assert_eq!(
        method.line_number_table,
        vec![
            LineNumberEntry { start_pc: 0, line_number: 1 },
            LineNumberEntry { start_pc: 4, line_number: 2 },
        ]
    );
    // `j` is in scope from its store to the end of the method
    assert_eq!(
        method.local_variable_table,
        vec![LocalVariableEntry {
            start_pc: 4,
            length: 1,
            name: Utf8Index(ConstantIndex(1)),
            descriptor: Utf8Index(ConstantIndex(2)),
            index: 1,
        }]
    );
}

#[test]
fn consecutive_statements_on_one_line_share_a_row() {
    // line 7: int j = 0; j = 1;
    // line 9: return;
    let body = vec![
        declare_j(7, int(0)),
        assign_j(7, int(1)),
        Statement::at_line(9, StatementKind::Return(None)),
    ];
    let method = compile(vec![], body);

    assert_eq!(method.code, vec![0x03, 0x3c, 0x04, 0x3c, 0xb1]);
    assert_eq!(
        method.line_number_table,
        vec![
            LineNumberEntry { start_pc: 0, line_number: 7 },
            LineNumberEntry { start_pc: 4, line_number: 9 },
        ]
    );
}

#[test]
fn a_statement_that_emits_nothing_cedes_its_row() {
    // line 7: 5; (a pure expression statement lowers to no code)
    // line 8: return;
    let body = vec![
        Statement::at_line(7, StatementKind::Expr(int(5))),
        Statement::at_line(8, StatementKind::Return(None)),
    ];
    let method = compile(vec![], body);

    assert_eq!(method.code, vec![0xb1]);
    assert_eq!(
        method.line_number_table,
        vec![LineNumberEntry { start_pc: 0, line_number: 8 }]
    );
}

#[test]
fn block_scoped_locals_close_at_the_block_end() {
    // { int j = 1; j = 2; } return;
    let body = vec![
        Statement::new(StatementKind::Block(vec![
            declare_j(1, int(1)),
            assign_j(2, int(2)),
        ])),
        Statement::new(StatementKind::Return(None)),
    ];
    let method = compile(vec![], body);

    assert_eq!(method.code, vec![0x04, 0x3c, 0x05, 0x3c, 0xb1]);
    // The range stops at the block's end, not the method's
    assert_eq!(
        method.local_variable_table,
        vec![LocalVariableEntry {
            start_pc: 2,
            length: 2,
            name: Utf8Index(ConstantIndex(1)),
            descriptor: Utf8Index(ConstantIndex(2)),
            index: 1,
        }]
    );
}
