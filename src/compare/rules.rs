//! Per-opcode rules for deciding whether two instructions with the same opcode behave the same
//!
//! Operands that point into the constant pool are compared by what they resolve to, never by raw
//! index. Jump offsets are compared raw in exact mode; in switchable mode they are compared by
//! where they land (backward jumps right away, forward jumps once all insertions are known).

use super::comparator::Comparison;
use super::{ComparisonMode, LoadableConstant};
use crate::jvm::{Instruction, OpcodeFamily, Operands};

impl<'a> Comparison<'a> {
    /// Check that two instructions with the same opcode have equivalent operands
    ///
    /// In switchable mode this may queue forward jumps. If the answer is `false`, the caller is
    /// expected to discard anything queued.
    pub(super) fn same_arguments(&mut self, old: &Instruction, new: &Instruction) -> bool {
        match old.opcode().family() {
            OpcodeFamily::ClassRef => self.same_class_ref(old, new),
            OpcodeFamily::MemberRef => self.same_member_ref(old, new),
            OpcodeFamily::LoadConstant | OpcodeFamily::LoadWideConstant => {
                self.same_loadable(old, new)
            }
            OpcodeFamily::ByteImmediate
            | OpcodeFamily::ShortImmediate
            | OpcodeFamily::LocalVariable
            | OpcodeFamily::Increment => {
                old.is_wide() == new.is_wide() && old.operands() == new.operands()
            }
            OpcodeFamily::Branch => self.same_branch(old, new),
            OpcodeFamily::LookupSwitch | OpcodeFamily::TableSwitch
                if self.mode == ComparisonMode::Exact =>
            {
                old.bytes() == new.bytes()
            }
            OpcodeFamily::LookupSwitch => self.same_lookup_switch(old, new),
            OpcodeFamily::TableSwitch => self.same_table_switch(old, new),
            OpcodeFamily::Plain => true,
        }
    }

    fn same_class_ref(&self, old: &Instruction, new: &Instruction) -> bool {
        let same_class = match (old.constant_index(), new.constant_index()) {
            (Some(old_index), Some(new_index)) => {
                match (
                    self.old_constants.class_name_at(old_index),
                    self.new_constants.class_name_at(new_index),
                ) {
                    (Some(old_class), Some(new_class)) => old_class == new_class,
                    _ => false,
                }
            }
            _ => false,
        };
        match (old.operands(), new.operands()) {
            (
                Operands::MultiANewArray {
                    dimensions: old_dimensions,
                    ..
                },
                Operands::MultiANewArray {
                    dimensions: new_dimensions,
                    ..
                },
            ) => same_class && old_dimensions == new_dimensions,
            _ => same_class,
        }
    }

    fn same_member_ref(&self, old: &Instruction, new: &Instruction) -> bool {
        match (old.constant_index(), new.constant_index()) {
            (Some(old_index), Some(new_index)) => {
                match (
                    self.old_constants.member_ref_at(old_index),
                    self.new_constants.member_ref_at(new_index),
                ) {
                    (Some(old_member), Some(new_member)) => old_member == new_member,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn same_loadable(&self, old: &Instruction, new: &Instruction) -> bool {
        let (old_index, new_index) = match (old.constant_index(), new.constant_index()) {
            (Some(old_index), Some(new_index)) => (old_index, new_index),
            _ => return false,
        };
        match (
            self.old_constants.loadable_at(old_index),
            self.new_constants.loadable_at(new_index),
        ) {
            (Some(old_constant), Some(new_constant)) => same_constant(old_constant, new_constant),
            _ => false,
        }
    }

    fn same_branch(&mut self, old: &Instruction, new: &Instruction) -> bool {
        let (old_offset, new_offset) = match (old.operands(), new.operands()) {
            (Operands::Branch(old_offset), Operands::Branch(new_offset)) => {
                (*old_offset, *new_offset)
            }
            _ => return false,
        };
        if self.mode == ComparisonMode::Exact {
            return old_offset == new_offset;
        }

        let (old_target, new_target) = match (old.target(old_offset), new.target(new_offset)) {
            (Some(old_target), Some(new_target)) => (old_target, new_target),
            _ => return false,
        };
        if old_offset <= 0 && new_offset <= 0 {
            self.backward_targets_agree(old_target, new, new_target)
        } else if old_offset > 0 && new_offset > 0 {
            self.pending.push(old_target, new_target);
            true
        } else {
            false
        }
    }

    /// Check a backward jump target against the fragments recorded so far
    ///
    /// While resynchronizing, `new` is a candidate for the end of a fragment that isn't recorded
    /// yet. A jump back to the old instruction itself must then land on the candidate.
    fn backward_targets_agree(
        &self,
        old_target: usize,
        new: &Instruction,
        new_target: usize,
    ) -> bool {
        let mut expected = self.positions.translate(old_target);
        if let Some(resync) = &self.resync {
            if old_target >= resync.old_bci {
                expected += new.bci() - resync.new_start;
            }
        }
        expected == new_target
    }

    /// Queue a switch target pair (switch targets are always checked at the end)
    fn queue_switch_target(
        &mut self,
        old: &Instruction,
        old_offset: i32,
        new: &Instruction,
        new_offset: i32,
    ) -> bool {
        match (old.target(old_offset), new.target(new_offset)) {
            (Some(old_target), Some(new_target)) => {
                self.pending.push(old_target, new_target);
                true
            }
            _ => false,
        }
    }

    fn same_lookup_switch(&mut self, old: &Instruction, new: &Instruction) -> bool {
        let (old_switch, new_switch) = match (old.operands(), new.operands()) {
            (Operands::LookupSwitch(old_switch), Operands::LookupSwitch(new_switch)) => {
                (old_switch, new_switch)
            }
            _ => return false,
        };
        if !self.queue_switch_target(old, old_switch.default, new, new_switch.default) {
            return false;
        }
        if old_switch.len() != new_switch.len() {
            return false;
        }
        for ((old_key, old_offset), (new_key, new_offset)) in
            old_switch.pairs().zip(new_switch.pairs())
        {
            if old_key != new_key || !self.queue_switch_target(old, old_offset, new, new_offset) {
                return false;
            }
        }
        true
    }

    fn same_table_switch(&mut self, old: &Instruction, new: &Instruction) -> bool {
        let (old_switch, new_switch) = match (old.operands(), new.operands()) {
            (Operands::TableSwitch(old_switch), Operands::TableSwitch(new_switch)) => {
                (old_switch, new_switch)
            }
            _ => return false,
        };
        if !self.queue_switch_target(old, old_switch.default, new, new_switch.default) {
            return false;
        }
        if old_switch.low != new_switch.low || old_switch.high != new_switch.high {
            return false;
        }
        for (old_offset, new_offset) in old_switch.offsets().zip(new_switch.offsets()) {
            if !self.queue_switch_target(old, old_offset, new, new_offset) {
                return false;
            }
        }
        true
    }
}

/// Loadable constants are the same if they have the same kind and value
///
/// Floating point values are compared by bit pattern (so `NaN` matches itself, but `0.0` doesn't
/// match `-0.0`). Dynamic constants never match.
fn same_constant(old: LoadableConstant, new: LoadableConstant) -> bool {
    use LoadableConstant::*;
    match (old, new) {
        (Integer(old), Integer(new)) => old == new,
        (Float(old), Float(new)) => old.to_bits() == new.to_bits(),
        (Long(old), Long(new)) => old == new,
        (Double(old), Double(new)) => old.to_bits() == new.to_bits(),
        (String(old), String(new))
        | (Class(old), Class(new))
        | (MethodType(old), MethodType(new)) => old == new,
        (
            MethodHandle {
                kind: old_kind,
                member: old_member,
            },
            MethodHandle {
                kind: new_kind,
                member: new_member,
            },
        ) => old_kind == new_kind && old_member == new_member,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compare::MemberRef;
    use crate::jvm::{
        BytecodeStream, CodeBuilder, ConstantIndex, ConstantPool, HandleKind, Instruction, Opcode,
    };

    fn only_instruction(code: &[u8]) -> Instruction<'_> {
        BytecodeStream::new(code).next().unwrap().unwrap()
    }

    fn build(f: impl FnOnce(&mut CodeBuilder)) -> Vec<u8> {
        let mut code = CodeBuilder::new();
        f(&mut code);
        code.finish().unwrap()
    }

    #[test]
    fn constants_by_kind_and_value() {
        assert!(same_constant(LoadableConstant::Integer(5), LoadableConstant::Integer(5)));
        assert!(!same_constant(LoadableConstant::Integer(5), LoadableConstant::Integer(6)));
        assert!(!same_constant(LoadableConstant::Integer(0), LoadableConstant::Float(0.0)));
        assert!(same_constant(
            LoadableConstant::Float(f32::NAN),
            LoadableConstant::Float(f32::NAN)
        ));
        assert!(!same_constant(
            LoadableConstant::Double(0.0),
            LoadableConstant::Double(-0.0)
        ));
        assert!(!same_constant(
            LoadableConstant::String("java/lang/Object"),
            LoadableConstant::Class("java/lang/Object")
        ));
        assert!(!same_constant(LoadableConstant::Dynamic, LoadableConstant::Dynamic));

        let member = MemberRef {
            owner: "me/A",
            name: "f",
            descriptor: "()V",
        };
        assert!(same_constant(
            LoadableConstant::MethodHandle {
                kind: HandleKind::InvokeStatic,
                member
            },
            LoadableConstant::MethodHandle {
                kind: HandleKind::InvokeStatic,
                member
            }
        ));
        assert!(!same_constant(
            LoadableConstant::MethodHandle {
                kind: HandleKind::InvokeStatic,
                member
            },
            LoadableConstant::MethodHandle {
                kind: HandleKind::InvokeVirtual,
                member
            }
        ));
    }

    #[test]
    fn member_refs_ignore_raw_indices() {
        let mut old_pool = ConstantPool::new();
        let mut new_pool = ConstantPool::new();
        new_pool.get_integer(42).unwrap();

        let old_code = build(|code| {
            let field = old_pool.get_field_ref("me/A", "count", "I").unwrap();
            code.constant_op(Opcode::GetStatic, field);
        });
        let new_code = build(|code| {
            let field = new_pool.get_field_ref("me/A", "count", "I").unwrap();
            code.constant_op(Opcode::GetStatic, field);
        });
        let other_code = build(|code| {
            let field = new_pool.get_field_ref("me/A", "total", "I").unwrap();
            code.constant_op(Opcode::GetStatic, field);
        });
        assert_ne!(old_code, new_code);

        let mut comparison = Comparison::new(&old_pool, &new_pool, ComparisonMode::Exact);
        let old = only_instruction(&old_code);
        assert!(comparison.same_arguments(&old, &only_instruction(&new_code)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&other_code)));
    }

    #[test]
    fn multianewarray_dimensions() {
        let mut pool = ConstantPool::new();
        let class: ConstantIndex = pool.get_class("[[[I").unwrap().into();
        let two = build(|code| {
            code.multianewarray(class, 2);
        });
        let three = build(|code| {
            code.multianewarray(class, 3);
        });

        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        let old = only_instruction(&two);
        assert!(comparison.same_arguments(&old, &only_instruction(&two)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&three)));
    }

    #[test]
    fn wide_flag_matters_for_locals() {
        let pool = ConstantPool::new();
        let narrow = build(|code| {
            code.local(Opcode::ILoad, 4);
        });
        let wide = build(|code| {
            code.wide_local(Opcode::ILoad, 4);
        });
        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        let old = only_instruction(&narrow);
        assert!(comparison.same_arguments(&old, &only_instruction(&narrow)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&wide)));
    }

    #[test]
    fn immediates_must_be_identical() {
        let pool = ConstantPool::new();
        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);

        let five = build(|code| {
            code.bipush(5);
        });
        let six = build(|code| {
            code.bipush(6);
        });
        let old = only_instruction(&five);
        assert!(comparison.same_arguments(&old, &only_instruction(&five)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&six)));

        let big = build(|code| {
            code.sipush(300);
        });
        let bigger = build(|code| {
            code.sipush(301);
        });
        let old = only_instruction(&big);
        assert!(comparison.same_arguments(&old, &only_instruction(&big)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&bigger)));
    }

    #[test]
    fn increments_compare_slot_delta_and_width() {
        let pool = ConstantPool::new();
        let base = build(|code| {
            code.iinc(1, 1);
        });
        let other_slot = build(|code| {
            code.iinc(2, 1);
        });
        let other_delta = build(|code| {
            code.iinc(1, -1);
        });
        let widened = build(|code| {
            code.wide_iinc(1, 1);
        });

        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Switchable);
        let old = only_instruction(&base);
        assert!(comparison.same_arguments(&old, &only_instruction(&base)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&other_slot)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&other_delta)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&widened)));
    }

    #[test]
    fn ret_compares_its_slot() {
        let pool = ConstantPool::new();
        let three = build(|code| {
            code.local(Opcode::Ret, 3);
        });
        let four = build(|code| {
            code.local(Opcode::Ret, 4);
        });
        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        let old = only_instruction(&three);
        assert!(comparison.same_arguments(&old, &only_instruction(&three)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&four)));
    }

    #[test]
    fn class_operands_compare_by_name() {
        let mut old_pool = ConstantPool::new();
        let old_list: ConstantIndex = old_pool.get_class("java/util/List").unwrap().into();

        let mut new_pool = ConstantPool::new();
        new_pool.get_utf8("padding").unwrap();
        let new_map: ConstantIndex = new_pool.get_class("java/util/Map").unwrap().into();
        let new_list: ConstantIndex = new_pool.get_class("java/util/List").unwrap().into();
        assert_ne!(old_list, new_list);

        let mut comparison = Comparison::new(&old_pool, &new_pool, ComparisonMode::Exact);
        for &opcode in &[
            Opcode::New,
            Opcode::ANewArray,
            Opcode::CheckCast,
            Opcode::InstanceOf,
        ] {
            let old_code = build(|code| {
                code.constant_op(opcode, old_list);
            });
            let same = build(|code| {
                code.constant_op(opcode, new_list);
            });
            let different = build(|code| {
                code.constant_op(opcode, new_map);
            });
            let old = only_instruction(&old_code);
            assert!(comparison.same_arguments(&old, &only_instruction(&same)));
            assert!(!comparison.same_arguments(&old, &only_instruction(&different)));
        }
    }

    #[test]
    fn class_literals_see_through_resolution() {
        let mut old_pool = ConstantPool::new();
        let old_list: ConstantIndex = old_pool.get_class("java/util/List").unwrap().into();

        let mut new_pool = ConstantPool::new();
        let new_map: ConstantIndex = new_pool.get_class("java/util/Map").unwrap().into();
        let new_list: ConstantIndex = new_pool.get_class("java/util/List").unwrap().into();
        new_pool.resolve(new_list).unwrap();
        new_pool.resolve(new_map).unwrap();

        let old_code = build(|code| {
            code.ldc(old_list);
        });
        let same = build(|code| {
            code.ldc(new_list);
        });
        let different = build(|code| {
            code.ldc(new_map);
        });

        let mut comparison = Comparison::new(&old_pool, &new_pool, ComparisonMode::Exact);
        let old = only_instruction(&old_code);
        assert!(comparison.same_arguments(&old, &only_instruction(&same)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&different)));
    }

    #[test]
    fn wide_constants_compare_kind_and_bits() {
        let bits: u64 = 0x4000_0000_0000_0000;
        let mut old_pool = ConstantPool::new();
        let old_long = old_pool.get_long(bits as i64).unwrap();

        let mut new_pool = ConstantPool::new();
        let new_double = new_pool.get_double(f64::from_bits(bits)).unwrap();
        let new_long = new_pool.get_long(bits as i64).unwrap();

        let old_code = build(|code| {
            code.constant_op(Opcode::Ldc2W, old_long);
        });
        let same = build(|code| {
            code.constant_op(Opcode::Ldc2W, new_long);
        });
        let different = build(|code| {
            code.constant_op(Opcode::Ldc2W, new_double);
        });

        let mut comparison = Comparison::new(&old_pool, &new_pool, ComparisonMode::Exact);
        let old = only_instruction(&old_code);
        assert!(comparison.same_arguments(&old, &only_instruction(&same)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&different)));
    }

    #[test]
    fn interface_calls_compare_by_member() {
        let mut pool = ConstantPool::new();
        let size = pool
            .get_method_ref("java/util/List", "size", "()I", true)
            .unwrap();
        let hash = pool
            .get_method_ref("java/util/List", "hashCode", "()I", true)
            .unwrap();
        let sized = build(|code| {
            code.invokeinterface(size, 1);
        });
        let hashed = build(|code| {
            code.invokeinterface(hash, 1);
        });

        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        let old = only_instruction(&sized);
        assert!(comparison.same_arguments(&old, &only_instruction(&sized)));
        assert!(!comparison.same_arguments(&old, &only_instruction(&hashed)));
    }

    #[test]
    fn opcode_only_instructions_ignore_operands() {
        // `newarray` element types and `invokedynamic` call sites are not looked at
        let pool = ConstantPool::new();
        let ints = build(|code| {
            code.newarray(10);
        });
        let longs = build(|code| {
            code.newarray(11);
        });
        let first_site = build(|code| {
            code.invokedynamic(ConstantIndex(1));
        });
        let second_site = build(|code| {
            code.invokedynamic(ConstantIndex(2));
        });

        let mut comparison = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        assert!(comparison.same_arguments(&only_instruction(&ints), &only_instruction(&longs)));
        assert!(comparison.same_arguments(
            &only_instruction(&first_site),
            &only_instruction(&second_site)
        ));
    }

    #[test]
    fn four_byte_branch_offsets_by_mode() {
        let pool = ConstantPool::new();
        let goto_w_5 = [0xc8, 0x00, 0x00, 0x00, 0x05];
        let goto_w_6 = [0xc8, 0x00, 0x00, 0x00, 0x06];
        let jsr_w_self = [0xc9, 0x00, 0x00, 0x00, 0x00];
        let jsr_w_5 = [0xc9, 0x00, 0x00, 0x00, 0x05];

        let mut exact = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        let (goto_w_5, goto_w_6) = (only_instruction(&goto_w_5), only_instruction(&goto_w_6));
        let (jsr_w_self, jsr_w_5) = (only_instruction(&jsr_w_self), only_instruction(&jsr_w_5));
        assert!(exact.same_arguments(&goto_w_5, &goto_w_5));
        assert!(!exact.same_arguments(&goto_w_5, &goto_w_6));
        assert!(exact.same_arguments(&jsr_w_self, &jsr_w_self));
        assert!(exact.pending.is_empty());

        let mut switchable = Comparison::new(&pool, &pool, ComparisonMode::Switchable);
        assert!(switchable.same_arguments(&goto_w_5, &goto_w_6));
        assert_eq!(switchable.pending.len(), 1);
        assert!(switchable.same_arguments(&jsr_w_self, &jsr_w_self));
        assert!(!switchable.same_arguments(&jsr_w_self, &jsr_w_5));
        assert_eq!(switchable.pending.len(), 1);
    }

    #[test]
    fn branch_offsets_by_mode() {
        let pool = ConstantPool::new();
        let forward_3 = [0xa7, 0x00, 0x03];
        let forward_5 = [0xa7, 0x00, 0x05];
        let self_loop = [0xa7, 0x00, 0x00];

        let mut exact = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        assert!(exact.same_arguments(&only_instruction(&forward_3), &only_instruction(&forward_3)));
        assert!(
            !exact.same_arguments(&only_instruction(&forward_3), &only_instruction(&forward_5))
        );
        assert!(exact.pending.is_empty());

        // Forward jumps are deferred, whatever their targets
        let mut switchable = Comparison::new(&pool, &pool, ComparisonMode::Switchable);
        assert!(switchable
            .same_arguments(&only_instruction(&forward_3), &only_instruction(&forward_5)));
        assert_eq!(switchable.pending.len(), 1);

        // Direction mismatch fails right away
        assert!(!switchable
            .same_arguments(&only_instruction(&forward_3), &only_instruction(&self_loop)));
    }

    #[test]
    fn switches_queue_every_target() {
        let pool = ConstantPool::new();
        let table = build(|code| {
            let (a, b, c) = (code.fresh_label(), code.fresh_label(), code.fresh_label());
            code.tableswitch(c, 3, &[a, b])
                .place_label(a)
                .place_label(b)
                .place_label(c)
                .op(Opcode::Return);
        });
        let shifted = build(|code| {
            let (a, b, c) = (code.fresh_label(), code.fresh_label(), code.fresh_label());
            code.tableswitch(c, 4, &[a, b])
                .place_label(a)
                .place_label(b)
                .place_label(c)
                .op(Opcode::Return);
        });

        let mut switchable = Comparison::new(&pool, &pool, ComparisonMode::Switchable);
        let old = only_instruction(&table);
        assert!(switchable.same_arguments(&old, &only_instruction(&table)));
        assert_eq!(switchable.pending.len(), 3);
        assert!(!switchable.same_arguments(&old, &only_instruction(&shifted)));

        let mut exact = Comparison::new(&pool, &pool, ComparisonMode::Exact);
        assert!(exact.same_arguments(&old, &only_instruction(&table)));
        assert!(!exact.same_arguments(&old, &only_instruction(&shifted)));
        assert!(exact.pending.is_empty());
    }

    #[test]
    fn lookup_switch_keys_must_agree() {
        let pool = ConstantPool::new();
        let keyed = |key: i32| {
            build(move |code| {
                let (a, dflt) = (code.fresh_label(), code.fresh_label());
                code.lookupswitch(dflt, &[(key, a)])
                    .place_label(a)
                    .place_label(dflt)
                    .op(Opcode::Return);
            })
        };
        let (one, two) = (keyed(1), keyed(2));
        let mut switchable = Comparison::new(&pool, &pool, ComparisonMode::Switchable);
        let old = only_instruction(&one);
        assert!(switchable.same_arguments(&old, &only_instruction(&one)));
        assert_eq!(switchable.pending.len(), 2);
        assert!(!switchable.same_arguments(&old, &only_instruction(&two)));
    }
}
