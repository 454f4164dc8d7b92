//! Exception-table layout and finally replay, in both the inline-duplication and the legacy
//! `jsr` subroutine schemes.

use tree2class::code::{InvokeKind, MethodCode};
use tree2class::jvm::{
    BootstrapMethodsTable, ClassIndex, ConstantIndex, ConstantPool, ExceptionTableEntry,
    FieldType, MethodAccessFlags, MethodDescriptor,
};
use tree2class::tree::{
    Catch, Const, Expr, FinallyStrategy, MethodRef, MethodSpec, Statement, StatementKind,
};

fn compile(
    strategy: FinallyStrategy,
    params: Vec<FieldType>,
    return_type: Option<FieldType>,
    body: Vec<Statement>,
) -> MethodCode {
    let _ = env_logger::builder().is_test(true).try_init();
    let spec = MethodSpec {
        access_flags: MethodAccessFlags::PUBLIC,
        name: "test".to_owned(),
        descriptor: MethodDescriptor::new(params, return_type),
        body,
        finally_strategy: strategy,
    };
    let mut pool = ConstantPool::new();
    let mut bootstrap = BootstrapMethodsTable::new();
    tree2class::lower::compile_method(&spec, &mut pool, &mut bootstrap).unwrap()
}

fn call(name: &str, return_type: Option<FieldType>) -> Expr {
    Expr::Call {
        invoke: InvokeKind::Static,
        receiver: None,
        method: MethodRef {
            class: "T".to_owned(),
            name: name.to_owned(),
            descriptor: MethodDescriptor::new(vec![], return_type),
            is_interface: false,
        },
        args: vec![],
    }
}

fn call_stmt(name: &str) -> Statement {
    Statement::new(StatementKind::Expr(call(name, None)))
}

fn try_catch_finally() -> Statement {
    Statement::new(StatementKind::Try {
        body: Box::new(call_stmt("work")),
        catches: vec![Catch {
            class: "java/lang/RuntimeException".to_owned(),
            slot: 1,
            name: "e".to_owned(),
            body: call_stmt("handle"),
        }],
        finally: Some(Box::new(call_stmt("cleanup"))),
    })
}

#[test]
fn duplication_covers_every_exit_edge() {
    let method = compile(
        FinallyStrategy::Duplicate,
        vec![],
        None,
        vec![try_catch_finally()],
    );

    assert_eq!(
        method.code,
        vec![
            0xb8, 0, 6, // try: work()
            0xb8, 0, 9, // cleanup() copy on the normal exit
            0xa7, 0, 19, // goto end
            0x4c, // catch: astore_1
            0xb8, 0, 14, // handle()
            0xb8, 0, 9, // cleanup() copy on the catch exit
            0xa7, 0, 9, // goto end
            0x4d, // catch-all: astore_2
            0xb8, 0, 9, // cleanup() copy in the handler
            0x2d, // aload_2
            0xbf, // athrow
            0xb1, // end: return
        ]
    );
    assert_eq!(
        method.exception_table,
        vec![
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 9,
                catch_type: Some(ClassIndex(ConstantIndex(16))),
            },
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 19,
                catch_type: None,
            },
            // The catch range stops short of the inline cleanup copy on its exit edge
            ExceptionTableEntry {
                start_pc: 9,
                end_pc: 13,
                handler_pc: 19,
                catch_type: None,
            },
        ]
    );
    assert_eq!(method.max_stack, 1);
    assert_eq!(method.max_locals, 3);
}

#[test]
fn subroutine_mode_shares_one_finally_body() {
    let method = compile(
        FinallyStrategy::Subroutine,
        vec![],
        None,
        vec![try_catch_finally()],
    );

    assert_eq!(
        method.code,
        vec![
            0xb8, 0, 6, // try: work()
            0xa8, 0, 22, // jsr finally
            0xa7, 0, 25, // goto end
            0x4c, // catch: astore_1
            0xb8, 0, 11, // handle()
            0xa8, 0, 12, // jsr finally
            0xa7, 0, 15, // goto end
            0x4d, // catch-all: astore_2
            0xa8, 0, 5, // jsr finally
            0x2d, // aload_2
            0xbf, // athrow
            0x4e, // finally: astore_3 (return address)
            0xb8, 0, 16, // cleanup()
            0xa9, 3, // ret 3
            0xb1, // end: return
        ]
    );
    // One typed row plus two catch-all rows, all three draining into the same handler pair
    assert_eq!(
        method.exception_table,
        vec![
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 9,
                catch_type: Some(ClassIndex(ConstantIndex(13))),
            },
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 19,
                catch_type: None,
            },
            ExceptionTableEntry {
                start_pc: 9,
                end_pc: 13,
                handler_pc: 19,
                catch_type: None,
            },
        ]
    );
    assert_eq!(method.max_locals, 4);
}

#[test]
fn return_value_rides_a_temporary_across_the_finally() {
    // int test() { try { return value(); } finally { cleanup(); } }
    let body = vec![Statement::new(StatementKind::Try {
        body: Box::new(Statement::new(StatementKind::Return(Some(call(
            "value",
            Some(FieldType::INT),
        ))))),
        catches: vec![],
        finally: Some(Box::new(call_stmt("cleanup"))),
    })];
    let method = compile(FinallyStrategy::Duplicate, vec![], Some(FieldType::INT), body);

    assert_eq!(
        method.code,
        vec![
            0xb8, 0, 6, // value()
            0x3c, // istore_1: park the return value
            0xb8, 0, 10, // cleanup() copy on the return edge
            0x1b, // iload_1
            0xac, // ireturn
            0x4c, // catch-all: astore_1
            0xb8, 0, 10, // cleanup() copy in the handler
            0x2b, // aload_1
            0xbf, // athrow
        ]
    );
    // The return edge (the cleanup copy plus the reload and ireturn after it) is excluded:
    // a throw out of the copy must reach the caller, not re-enter the handler
    assert_eq!(
        method.exception_table,
        vec![ExceptionTableEntry {
            start_pc: 0,
            end_pc: 4,
            handler_pc: 9,
            catch_type: None,
        }]
    );
    assert_eq!(method.max_locals, 2);
}

#[test]
fn break_edge_runs_the_finally_outside_the_protected_range() {
    // void test(boolean b) {
    //     while (true) { try { if (b) break; work(); } finally { cleanup(); } }
    // }
    let body = vec![Statement::new(StatementKind::While {
        condition: Expr::Const(Const::Boolean(true)),
        body: Box::new(Statement::new(StatementKind::Try {
            body: Box::new(Statement::new(StatementKind::Block(vec![
                Statement::new(StatementKind::If {
                    condition: Expr::Local {
                        slot: 1,
                        ty: FieldType::BOOLEAN,
                    },
                    then_branch: Box::new(Statement::new(StatementKind::Break)),
                    else_branch: None,
                }),
                call_stmt("work"),
            ]))),
            catches: vec![],
            finally: Some(Box::new(call_stmt("cleanup"))),
        })),
    })];
    let method = compile(
        FinallyStrategy::Duplicate,
        vec![FieldType::BOOLEAN],
        None,
        body,
    );

    assert_eq!(
        method.code,
        vec![
            0x1b, // loop: iload_1
            0x99, 0, 9, // ifeq past the break
            0xb8, 0, 6, // cleanup() copy on the break edge
            0xa7, 0, 21, // goto after the loop
            0xb8, 0, 9, // work()
            0xb8, 0, 6, // cleanup() copy on the normal exit
            0xa7, 0, 9, // goto past the handler
            0x4d, // catch-all: astore_2
            0xb8, 0, 6, // cleanup()
            0x2d, // aload_2
            0xbf, // athrow
            0xa7, 0xff, 0xe7, // goto loop
            0xb1, // return
        ]
    );
    // The protected range splits around the break edge's inline cleanup copy and its goto
    assert_eq!(
        method.exception_table,
        vec![
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 4,
                handler_pc: 19,
                catch_type: None,
            },
            ExceptionTableEntry {
                start_pc: 10,
                end_pc: 13,
                handler_pc: 19,
                catch_type: None,
            },
        ]
    );
    assert_eq!(method.max_stack, 1);
    assert_eq!(method.max_locals, 3);
}
