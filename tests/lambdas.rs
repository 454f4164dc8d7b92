//! Lambda creation sites: bootstrap-method linkage through `metafactory` and
//! `altMetafactory`, and the deduplication of structurally identical sites.

use tree2class::code::MethodCode;
use tree2class::jvm::{
    BootstrapMethod, BootstrapMethodsTable, Constant, ConstantIndex, ConstantPool, FieldType,
    HandleKind, MethodAccessFlags, MethodDescriptor,
};
use tree2class::tree::{
    Expr, FinallyStrategy, Handle, LambdaSite, MethodSpec, Statement, StatementKind,
};
use tree2class::util::Offset;

fn compile(body: Vec<Statement>) -> (MethodCode, ConstantPool, BootstrapMethodsTable) {
    let _ = env_logger::builder().is_test(true).try_init();
    let spec = MethodSpec {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name: "test".to_owned(),
        descriptor: MethodDescriptor::new(vec![], None),
        body,
        finally_strategy: FinallyStrategy::Duplicate,
    };
    let mut pool = ConstantPool::new();
    let mut bootstrap = BootstrapMethodsTable::new();
    let method = tree2class::lower::compile_method(&spec, &mut pool, &mut bootstrap).unwrap();
    (method, pool, bootstrap)
}

/// `Runnable r = () -> { ... };` with the body hoisted into `T.lambda$0`
fn runnable_site() -> LambdaSite {
    LambdaSite {
        interface: "java/lang/Runnable".to_owned(),
        method_name: "run".to_owned(),
        factory: MethodDescriptor::new(vec![], Some(FieldType::object("java/lang/Runnable"))),
        erased: MethodDescriptor::new(vec![], None),
        implementation: Handle {
            kind: HandleKind::InvokeStatic,
            class: "T".to_owned(),
            name: "lambda$0".to_owned(),
            descriptor: MethodDescriptor::new(vec![], None),
            is_interface: false,
        },
        instantiated: MethodDescriptor::new(vec![], None),
        serializable: false,
        markers: vec![],
        bridges: vec![],
        captures: vec![],
    }
}

fn declare(slot: u16, site: LambdaSite) -> Statement {
    Statement::new(StatementKind::Declare {
        slot,
        name: "r".to_owned(),
        ty: FieldType::object("java/lang/Runnable"),
        init: Some(Expr::Lambda(site)),
    })
}

#[test]
fn plain_site_links_through_metafactory() {
    let (method, pool, bootstrap) = compile(vec![declare(0, runnable_site())]);

    // invokedynamic (two zero operand bytes); astore_0; return
    assert_eq!(method.code, vec![0xba, 0, 19, 0, 0, 0x4b, 0xb1]);
    assert_eq!(method.max_stack, 1);

    // Exactly one bootstrap entry: the metafactory handle plus the three standard arguments
    // (erased MethodType, implementation MethodHandle, instantiated MethodType)
    assert_eq!(
        bootstrap.into_methods(),
        vec![BootstrapMethod {
            bootstrap_method: ConstantIndex(15),
            arguments: vec![ConstantIndex(2), ConstantIndex(8), ConstantIndex(2)],
        }]
    );

    let entries = pool.into_entries();
    assert!(matches!(
        entries.get(Offset(19)),
        Some(Constant::InvokeDynamic {
            bootstrap_method: 0,
            ..
        })
    ));
    assert!(matches!(
        entries.get(Offset(8)),
        Some(Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member: ConstantIndex(7),
        })
    ));
    // Erased and instantiated descriptors are the same here and share one MethodType
    assert!(matches!(
        entries.get(Offset(2)),
        Some(Constant::MethodType { .. })
    ));
}

#[test]
fn identical_sites_share_linkage() {
    let (method, _pool, bootstrap) = compile(vec![
        declare(0, runnable_site()),
        declare(1, runnable_site()),
    ]);

    // Both creation sites point at constant 19 and bootstrap entry 0
    assert_eq!(
        method.code,
        vec![0xba, 0, 19, 0, 0, 0x4b, 0xba, 0, 19, 0, 0, 0x4c, 0xb1]
    );
    assert_eq!(bootstrap.into_methods().len(), 1);
}

#[test]
fn serializable_marker_site_links_through_alt_metafactory() {
    let site = LambdaSite {
        serializable: true,
        markers: vec!["java/lang/Cloneable".to_owned()],
        ..runnable_site()
    };
    let (_method, pool, bootstrap) = compile(vec![declare(0, site)]);

    let methods = bootstrap.into_methods();
    assert_eq!(methods.len(), 1);
    // Three standard arguments, then the flags word, the marker count, and the marker class
    assert_eq!(
        methods[0].arguments,
        vec![
            ConstantIndex(2),
            ConstantIndex(8),
            ConstantIndex(2),
            ConstantIndex(9),
            ConstantIndex(10),
            ConstantIndex(12),
        ]
    );

    let entries = pool.into_entries();
    assert!(matches!(
        entries.get(Offset(9)),
        Some(Constant::Integer(3)) // FLAG_SERIALIZABLE | FLAG_MARKERS
    ));
    assert!(matches!(entries.get(Offset(10)), Some(Constant::Integer(1))));
    assert!(matches!(entries.get(Offset(12)), Some(Constant::Class(_))));
    // The bootstrap handle wraps the altMetafactory ref, interned after the arguments
    assert!(matches!(
        entries.get(Offset(19)),
        Some(Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member: ConstantIndex(18),
        })
    ));
    assert_eq!(methods[0].bootstrap_method, ConstantIndex(19));
}
