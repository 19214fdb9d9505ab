//! Record bodies with the buffered builder, then encode them

use jvmforge::jvm::class_file::ConstantPool;
use jvmforge::jvm::code::{
    BufferedCode, BufferedCodeBuilder, CodeBuilder, CodeBuilderExt, ConstantValue,
    DirectCodeBuilder, MethodInfo, SwitchEncoding,
};
use jvmforge::jvm::options::CodeOptions;
use jvmforge::jvm::verifier::StackMapFrame;
use jvmforge::jvm::{
    BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, TypeKind,
    UnqualifiedName,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn method() -> MethodInfo {
    MethodInfo::new(
        BinaryName::from_str("me/Switches").unwrap(),
        UnqualifiedName::from_str("pick").unwrap(),
        MethodDescriptor::parse("(I)I").unwrap(),
        MethodAccessFlags::STATIC,
    )
}

fn record(pool: &mut ConstantPool) -> BufferedCode {
    let mut builder = BufferedCodeBuilder::new(method(), pool);
    builder.load(TypeKind::Int, 0).unwrap();
    builder
        .switch_on(SwitchEncoding::Table, |cases| {
            cases
                .case(1, |case| {
                    case.load_constant(ConstantValue::Int(10))?;
                    case.return_(TypeKind::Int)
                })
                .case(3, |case| {
                    case.load_constant(ConstantValue::Int(20))?;
                    case.return_(TypeKind::Int)
                })
                .default(|case| {
                    case.load_constant(ConstantValue::Int(0))?;
                    case.return_(TypeKind::Int)
                });
            Ok(())
        })
        .unwrap();
    builder.build().unwrap()
}

#[test]
fn table_switch_layout() {
    init_logging();
    let mut pool = ConstantPool::new();
    let body = record(&mut pool);

    let mut builder = DirectCodeBuilder::new(method(), &mut pool, CodeOptions::default());
    body.write_to(&mut builder).unwrap();
    let code = builder.finish().unwrap();

    let mut expected = vec![
        0x1a, // iload_0
        0xaa, // tableswitch
        0x00, 0x00, // padding
        0x00, 0x00, 0x00, 0x21, // default: +33
        0x00, 0x00, 0x00, 0x01, // low: 1
        0x00, 0x00, 0x00, 0x03, // high: 3
        0x00, 0x00, 0x00, 0x1b, // 1: +27
        0x00, 0x00, 0x00, 0x21, // 2: +33
        0x00, 0x00, 0x00, 0x1e, // 3: +30
    ];
    expected.extend_from_slice(&[0x10, 0x0a, 0xac]); // bipush 10; ireturn
    expected.extend_from_slice(&[0x10, 0x14, 0xac]); // bipush 20; ireturn
    expected.extend_from_slice(&[0x03, 0xac]); // iconst_0; ireturn
    assert_eq!(code.code, expected);
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 1);
    assert_eq!(
        code.stack_map_frames,
        vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 28 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 2 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 2 },
        ]
    );
}

#[test]
fn replays_are_independent() {
    init_logging();
    let mut pool = ConstantPool::new();
    let body = record(&mut pool);

    let mut first = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(method(), &mut first, CodeOptions::default());
    body.write_to(&mut builder).unwrap();
    let once = builder.finish().unwrap();

    // Second replay goes after a prefix, so every label moves
    let mut second = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(method(), &mut second, CodeOptions::default());
    builder.nop().unwrap();
    body.write_to(&mut builder).unwrap();
    let twice = builder.finish().unwrap();

    assert_eq!(twice.code[0], 0x00);
    assert_eq!(twice.code[3], 0x00);
    assert_eq!(twice.code.len(), once.code.len(), "one byte less of padding");
    assert_eq!(twice.stack_map_frames.len(), 3);
    assert_eq!(body.max_locals(), 1);
}

#[test]
fn locals_are_scoped_to_blocks() {
    init_logging();
    let mut pool = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(method(), &mut pool, CodeOptions::default());
    let mut slots = vec![];
    builder
        .block(|outer| {
            let long = outer.allocate_local(TypeKind::Long);
            slots.push(long);
            outer.load_constant(ConstantValue::Long(0))?;
            outer.store(TypeKind::Long, long)?;
            outer.block(|inner| {
                let int = inner.allocate_local(TypeKind::Int);
                slots.push(int);
                inner.load_constant(ConstantValue::Int(0))?;
                inner.store(TypeKind::Int, int)
            })?;
            outer.block(|inner| {
                let double = inner.allocate_local(TypeKind::Double);
                slots.push(double);
                inner.load_constant(ConstantValue::Double(0.0))?;
                inner.store(TypeKind::Double, double)
            })
        })
        .unwrap();
    slots.push(builder.allocate_local(TypeKind::Int));
    builder.load(TypeKind::Int, 0).unwrap();
    builder.return_(TypeKind::Int).unwrap();
    let code = builder.finish().unwrap();

    assert_eq!(slots, vec![1, 3, 3, 1]);
    assert_eq!(code.max_locals, 5);
}
