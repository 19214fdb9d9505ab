//! Build method bodies, serialize them, parse them back, and transform them

use jvmforge::jvm::class_file::{
    BufWriter, ClassFileBuilder, CodeAttribute, ConstantPool, Serialize, Version,
};
use jvmforge::jvm::class_graph::{
    CachingHierarchyResolver, ClassHierarchyResolver, StaticHierarchyResolver,
};
use jvmforge::jvm::code::{
    CodeBuilder, CodeBuilderExt, CodeElement, CodeModel, ConstantValue, DirectCodeBuilder,
    Instruction, MethodInfo, Opcode,
};
use jvmforge::jvm::options::{CodeOptions, ShortJumpsOption, StackMapsOption};
use jvmforge::jvm::verifier::{StackMapFrame, VerificationType};
use jvmforge::jvm::{
    BinaryName, ClassAccessFlags, Error, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, RefType, TypeKind, UnqualifiedName,
};
use std::collections::HashMap;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn name(s: &str) -> BinaryName {
    BinaryName::from_str(s).unwrap()
}

fn static_method(method_name: &str, descriptor: &str) -> MethodInfo {
    MethodInfo::new(
        name("me/Pipeline"),
        UnqualifiedName::from_str(method_name).unwrap(),
        MethodDescriptor::parse(descriptor).unwrap(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
    )
}

/// Payload of the `Code` attribute, as it appears in a class file
fn payload(code: &CodeAttribute, pool: &mut ConstantPool) -> Vec<u8> {
    let mut writer = BufWriter::with_pool(pool);
    code.serialize(&mut writer).unwrap();
    writer.into_bytes()
}

/// `int sum(int n)`: adds up `n + (n - 1) + ... + 1` in a loop
fn build_sum(pool: &mut ConstantPool) -> CodeAttribute {
    let mut builder =
        DirectCodeBuilder::new(static_method("sum", "(I)I"), pool, CodeOptions::default());
    let top = builder.new_label();
    let done = builder.new_label();
    let total = builder.allocate_local(TypeKind::Int);

    builder.load_constant(ConstantValue::Int(0)).unwrap();
    builder.store(TypeKind::Int, total).unwrap();
    builder.label_binding(top).unwrap();
    builder.load(TypeKind::Int, 0).unwrap();
    builder.branch(Opcode::IFLE, done).unwrap();
    builder.load(TypeKind::Int, total).unwrap();
    builder.load(TypeKind::Int, 0).unwrap();
    builder.instruction(Instruction::Operator(Opcode::IADD)).unwrap();
    builder.store(TypeKind::Int, total).unwrap();
    builder.iinc(0, -1).unwrap();
    builder.goto_(top).unwrap();
    builder.label_binding(done).unwrap();
    builder.load(TypeKind::Int, total).unwrap();
    builder.return_(TypeKind::Int).unwrap();
    builder.finish().unwrap()
}

#[test]
fn loop_frames() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);

    assert_eq!(
        code.code,
        vec![
            0x03, // iconst_0
            0x3c, // istore_1
            0x1a, // iload_0
            0x9e, 0x00, 0x0d, // ifle +13
            0x1b, // iload_1
            0x1a, // iload_0
            0x60, // iadd
            0x3c, // istore_1
            0x84, 0x00, 0xff, // iinc 0 -1
            0xa7, 0xff, 0xf5, // goto -11
            0x1b, // iload_1
            0xac, // ireturn
        ]
    );
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 2);
    assert_eq!(
        code.stack_map_frames,
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 2,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 13 },
        ]
    );
}

#[test]
fn parsed_frames_match_generated_frames() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);
    let bytes = payload(&code, &mut pool);

    let model = CodeModel::parse(&bytes, &pool, static_method("sum", "(I)I")).unwrap();
    assert_eq!(model.code(), code.code.as_slice());
    assert_eq!(model.stack_map_frames(), code.stack_map_frames.as_slice());
    let offsets: Vec<u16> = model.frames().iter().map(|(offset, _)| *offset).collect();
    assert_eq!(offsets, vec![2, 16]);
    for (_, frame) in model.frames() {
        let locals: Vec<_> = frame.locals.values().cloned().collect();
        assert_eq!(
            locals,
            vec![VerificationType::Integer, VerificationType::Integer]
        );
        assert_eq!(frame.stack.len(), 0);
    }
}

#[test]
fn identity_transform_is_byte_identical() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);
    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, static_method("sum", "(I)I")).unwrap();

    // Same pool indices, so the original stack map can be reused
    let mut extended = ConstantPool::extending(&pool);
    let mut builder = DirectCodeBuilder::transforming(
        &model,
        model.method().clone(),
        &mut extended,
        CodeOptions::default(),
    )
    .unwrap();
    CodeBuilderExt::transforming(
        &mut builder,
        &model,
        |builder: &mut dyn CodeBuilder, element: CodeElement| builder.with(element),
    )
    .unwrap();
    let rebuilt = builder.finish().unwrap();
    assert_eq!(payload(&rebuilt, &mut extended), bytes);

    // Unrelated pool, so everything gets recomputed
    let mut fresh = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(
        static_method("sum", "(I)I"),
        &mut fresh,
        CodeOptions::default(),
    );
    model.write_to(&mut builder).unwrap();
    let rebuilt = builder.finish().unwrap();
    assert_eq!(rebuilt.code, code.code);
    assert_eq!(rebuilt.max_stack, code.max_stack);
    assert_eq!(rebuilt.max_locals, code.max_locals);
    assert_eq!(rebuilt.stack_map_frames, code.stack_map_frames);
}

#[test]
fn transform_rewrites_instructions() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);
    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, static_method("sum", "(I)I")).unwrap();

    // Count down by two instead of one
    let mut target = ConstantPool::new();
    let mut builder = DirectCodeBuilder::transforming(
        &model,
        static_method("sumEveryOther", "(I)I"),
        &mut target,
        CodeOptions::default(),
    )
    .unwrap();
    CodeBuilderExt::transforming(
        &mut builder,
        &model,
        |builder: &mut dyn CodeBuilder, element: CodeElement| match element {
            CodeElement::Instruction(Instruction::Increment { slot, delta, .. }) => {
                builder.iinc(slot, delta * 2)
            }
            other => builder.with(other),
        },
    )
    .unwrap();
    let rebuilt = builder.finish().unwrap();
    assert_eq!(&rebuilt.code[10..13], &[0x84, 0x00, 0xfe]);
    assert_eq!(rebuilt.stack_map_frames, code.stack_map_frames);

    let mut other = ConstantPool::new();
    let changed = DirectCodeBuilder::transforming(
        &model,
        static_method("sum", "(J)I"),
        &mut other,
        CodeOptions::default(),
    );
    assert!(matches!(changed, Err(Error::ImmutableProperty("descriptor"))));
}

#[test]
fn fresh_locals_follow_original_locals() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);
    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, static_method("sum", "(I)I")).unwrap();
    assert_eq!(model.max_locals(), 2);

    let mut target = ConstantPool::new();
    let mut builder = DirectCodeBuilder::transforming(
        &model,
        static_method("sum", "(I)I"),
        &mut target,
        CodeOptions::default(),
    )
    .unwrap();
    let scratch = builder.allocate_local(TypeKind::Int);
    assert_eq!(scratch, 2);
    builder.load_constant(ConstantValue::Int(0)).unwrap();
    builder.store(TypeKind::Int, scratch).unwrap();
    model.write_to(&mut builder).unwrap();
    let rebuilt = builder.finish().unwrap();

    assert_eq!(&rebuilt.code[..2], &[0x03, 0x3d]); // iconst_0; istore_2
    assert_eq!(&rebuilt.code[2..], code.code.as_slice());
    assert_eq!(rebuilt.max_locals, 3);
}

#[test]
fn provided_frames_are_kept() {
    init_logging();
    let mut pool = ConstantPool::new();
    let code = build_sum(&mut pool);
    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, static_method("sum", "(I)I")).unwrap();

    let options = CodeOptions {
        stack_maps: StackMapsOption::Provided,
        ..CodeOptions::default()
    };
    let mut target = ConstantPool::new();
    let mut builder =
        DirectCodeBuilder::transforming(&model, static_method("sum", "(I)I"), &mut target, options)
            .unwrap();
    model.write_to(&mut builder).unwrap();
    let rebuilt = builder.finish().unwrap();
    assert_eq!(rebuilt.code, code.code);
    assert_eq!(rebuilt.stack_map_frames, code.stack_map_frames);
}

#[test]
fn handler_frames() {
    init_logging();
    let mut pool = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(
        static_method("guarded", "(I)I"),
        &mut pool,
        CodeOptions::default(),
    );
    builder
        .trying(
            |body| {
                body.load(TypeKind::Int, 0)?;
                body.return_(TypeKind::Int)
            },
            |catches| {
                catches.catching(&BinaryName::RUNTIMEEXCEPTION, |handler| {
                    handler.instruction(Instruction::Stack(Opcode::POP))?;
                    handler.load_constant(ConstantValue::Int(-1))?;
                    handler.return_(TypeKind::Int)
                })?;
                Ok(())
            },
        )
        .unwrap();
    let code = builder.finish().unwrap();

    assert_eq!(code.code, vec![0x1a, 0xac, 0x57, 0x02, 0xac]);
    assert_eq!(code.exception_table.len(), 1);
    let entry = code.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 2, 2));
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.stack_map_frames.len(), 1);
    assert!(matches!(
        code.stack_map_frames[0],
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 2,
            stack: VerificationType::Object(_),
        }
    ));

    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, static_method("guarded", "(I)I")).unwrap();
    let (offset, frame) = &model.frames()[0];
    assert_eq!(*offset, 2);
    let stack: Vec<_> = frame.stack.values().cloned().collect();
    assert_eq!(
        stack,
        vec![VerificationType::Object(RefType::Object(
            BinaryName::RUNTIMEEXCEPTION
        ))]
    );
    assert!(model
        .elements()
        .iter()
        .any(|element| matches!(element, CodeElement::ExceptionCatch { catch_type: Some(_), .. })));
}

#[test]
fn jumps_beyond_short_range() {
    init_logging();
    let build = |options: CodeOptions| {
        let mut pool = ConstantPool::new();
        let mut builder =
            DirectCodeBuilder::new(static_method("far", "(I)V"), &mut pool, options);
        let far = builder.new_label();
        builder.load(TypeKind::Int, 0)?;
        builder.branch(Opcode::IFEQ, far)?;
        for _ in 0..40000 {
            builder.nop()?;
        }
        builder.label_binding(far)?;
        builder.return_(TypeKind::Void)?;
        builder.finish()
    };

    let code = build(CodeOptions::default()).unwrap();
    assert_eq!(code.code.len(), 40013);
    assert_eq!(
        &code.code[..12],
        &[
            0x1a, // iload_0
            0x99, 0x00, 0x06, // ifeq +6
            0xa7, 0x00, 0x08, // goto +8
            0xc8, 0x00, 0x00, 0x9c, 0x45, // goto_w +40005
        ]
    );
    assert_eq!(code.code[40012], 0xb1);
    assert_eq!(code.stack_map_frames.len(), 3);

    let options = CodeOptions {
        short_jumps: ShortJumpsOption::Fail,
        ..CodeOptions::default()
    };
    assert!(matches!(
        build(options),
        Err(Error::BranchOffsetOverflow {
            offset: 1,
            target: 40004
        })
    ));
}

#[test]
fn far_goto_is_widened() {
    init_logging();
    let mut pool = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(
        static_method("skip", "()V"),
        &mut pool,
        CodeOptions::default(),
    );
    let far = builder.new_label();
    builder.goto_(far).unwrap();
    for _ in 0..40000 {
        builder.nop().unwrap();
    }
    builder.label_binding(far).unwrap();
    builder.return_(TypeKind::Void).unwrap();
    let code = builder.finish().unwrap();

    assert_eq!(code.code.len(), 40008);
    assert_eq!(
        &code.code[..7],
        &[
            0x00, 0x00, // nop; nop
            0xc8, 0x00, 0x00, 0x9c, 0x45, // goto_w +40005
        ]
    );
    assert_eq!(code.code[40007], 0xb1);
}

#[test]
fn merges_use_class_bytes() {
    init_logging();
    let class_bytes = |class: &str, superclass: &str| {
        let builder = ClassFileBuilder::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name(class),
            Some(name(superclass)),
        );
        builder.build(&mut ConstantPool::new()).unwrap()
    };
    let mut classes = HashMap::new();
    classes.insert(name("me/Animal"), class_bytes("me/Animal", "java/lang/Object"));
    classes.insert(name("me/Cat"), class_bytes("me/Cat", "me/Animal"));
    classes.insert(name("me/Dog"), class_bytes("me/Dog", "me/Animal"));
    let resolver: Arc<dyn ClassHierarchyResolver> = Arc::new(
        CachingHierarchyResolver::new(classes).or_else(StaticHierarchyResolver::java_core()),
    );

    let method = static_method("pick", "(ZLme/Cat;Lme/Dog;)Lme/Animal;");
    let mut pool = ConstantPool::new();
    let mut builder = DirectCodeBuilder::new(
        method.clone(),
        &mut pool,
        CodeOptions::default().with_class_hierarchy(resolver),
    );
    builder.load(TypeKind::Int, 0).unwrap();
    builder
        .if_then_else(
            Opcode::IFNE,
            |then| then.load(TypeKind::Reference, 1),
            |otherwise| otherwise.load(TypeKind::Reference, 2),
        )
        .unwrap();
    builder.return_(TypeKind::Reference).unwrap();
    let code = builder.finish().unwrap();
    assert_eq!(code.stack_map_frames.len(), 2);

    let bytes = payload(&code, &mut pool);
    let model = CodeModel::parse(&bytes, &pool, method).unwrap();
    let (_, join) = model.frames().last().unwrap();
    let stack: Vec<_> = join.stack.values().cloned().collect();
    assert_eq!(
        stack,
        vec![VerificationType::Object(RefType::Object(name("me/Animal")))]
    );
}

#[test]
fn broken_bytecode_is_rejected() {
    init_logging();
    let pool = ConstantPool::new();
    let method = static_method("broken", "()V");

    // `sipush` missing its second operand byte
    let mut writer = BufWriter::new();
    writer.write_u2(1);
    writer.write_u2(0);
    writer.write_u4(2);
    writer.write_bytes(&[0x11, 0x00]);
    writer.write_u2(0);
    writer.write_u2(0);
    let result = CodeModel::parse(&writer.into_bytes(), &pool, method.clone());
    assert!(matches!(result, Err(Error::IllegalBytecode { offset: 0, .. })));

    // Exception handler in the middle of an instruction
    let mut writer = BufWriter::new();
    writer.write_u2(1);
    writer.write_u2(0);
    writer.write_u4(4);
    writer.write_bytes(&[0x11, 0x00, 0x01, 0xb1]);
    writer.write_u2(1);
    writer.write_u2(0);
    writer.write_u2(3);
    writer.write_u2(1);
    writer.write_u2(0);
    writer.write_u2(0);
    let result = CodeModel::parse(&writer.into_bytes(), &pool, method);
    assert!(matches!(result, Err(Error::IllegalBytecode { offset: 1, .. })));
}
