//! Instruction set definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the table is written exactly once.
//!
//! This module generates:
//! - The [`Opcode`] enum with its persisted ids
//! - The dense [`OPCODES`] descriptor table indexed by id
//! - Lookup by id and by mnemonic
//!
//! See [`assembler`](super::assembler) for listing-related code generation.
//!
//! # Stability
//!
//! Opcode ids are persisted in compiled files. An id, once shipped, is never
//! reassigned; new instructions are appended at the end of the table.
//!
//! # Table format
//!
//! ```text
//! Name = id, "mnemonic" => [operand kinds], consumed => produced, Flow, [flags],
//! ```

use crate::bytecode::errors::BytecodeError;
use crate::bytecode::operand::StackSource::{Operand1, Operand2};
use crate::bytecode::operand::{OperandKind, StackEffect, fixed, scaled};
use std::fmt;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// noop ; does nothing, also the value of zero padding
            Noop = 0, "noop" => [], fixed(0) => fixed(0), Sequential, [],
            /// push_nil ; push nil
            PushNil = 1, "push_nil" => [], fixed(0) => fixed(1), Sequential, [],
            /// push_true ; push true
            PushTrue = 2, "push_true" => [], fixed(0) => fixed(1), Sequential, [],
            /// push_false ; push false
            PushFalse = 3, "push_false" => [], fixed(0) => fixed(1), Sequential, [],
            /// push_int n ; push the immediate integer n
            PushInt = 4, "push_int" => [Int], fixed(0) => fixed(1), Sequential, [],
            /// push_context ; push the current method context
            PushContext = 5, "push_context" => [], fixed(0) => fixed(1), Sequential, [],
            /// push_literal lit ; push literals[lit]
            PushLiteral = 6, "push_literal" => [Literal], fixed(0) => fixed(1), Sequential, [],
            /// push_self ; push the receiver
            PushSelf = 7, "push_self" => [], fixed(0) => fixed(1), Sequential, [],
            // =========================
            // Flow control
            // =========================
            /// goto ip ; jump to ip
            Goto = 8, "goto" => [Ip], fixed(0) => fixed(0), Goto, [],
            /// goto_if_false ip ; pop, jump to ip if false or nil
            GotoIfFalse = 9, "goto_if_false" => [Ip], fixed(1) => fixed(0), Goto, [],
            /// goto_if_true ip ; pop, jump to ip if truthy
            GotoIfTrue = 10, "goto_if_true" => [Ip], fixed(1) => fixed(0), Goto, [],
            /// goto_if_defined ip ; pop, jump to ip if not undefined
            GotoIfDefined = 11, "goto_if_defined" => [Ip], fixed(1) => fixed(0), Goto, [],
            /// ret ; return the top of stack to the caller
            Ret = 12, "ret" => [], fixed(0) => fixed(0), Return, [TERMINATOR],
            /// halt ; stop the machine
            Halt = 13, "halt" => [], fixed(0) => fixed(0), Return, [TERMINATOR],
            // =========================
            // Stack maintenance
            // =========================
            /// swap_stack ; swap the two topmost values
            SwapStack = 14, "swap_stack" => [], fixed(1) => fixed(1), Sequential, [],
            /// dup_top ; duplicate the top of stack
            DupTop = 15, "dup_top" => [], fixed(0) => fixed(1), Sequential, [],
            /// pop ; discard the top of stack
            Pop = 16, "pop" => [], fixed(1) => fixed(0), Sequential, [],
            /// set_local slot ; locals[slot] = top (value stays on the stack)
            SetLocal = 17, "set_local" => [Local], fixed(1) => fixed(1), Sequential, [],
            /// push_local slot ; push locals[slot]
            PushLocal = 18, "push_local" => [Local], fixed(0) => fixed(1), Sequential, [],
            /// push_exception ; push the current exception
            PushException = 19, "push_exception" => [], fixed(0) => fixed(1), Sequential, [],
            /// make_array n ; pop n values, push them as an array
            MakeArray = 20, "make_array" => [Int], scaled(1, Operand1, 0) => fixed(1), Sequential, [],
            /// set_ivar lit ; self.@literals[lit] = top
            SetIvar = 21, "set_ivar" => [Literal], fixed(1) => fixed(1), Sequential, [],
            /// push_ivar lit ; push self.@literals[lit]
            PushIvar = 22, "push_ivar" => [Literal], fixed(0) => fixed(1), Sequential, [],
            /// push_const lit ; push the constant named literals[lit]
            PushConst = 23, "push_const" => [Literal], fixed(0) => fixed(1), Sequential, [],
            /// set_const lit ; define constant literals[lit] = top
            SetConst = 24, "set_const" => [Literal], fixed(1) => fixed(1), Sequential, [],
            /// set_const_at lit ; pop value and module, define the constant under the module
            SetConstAt = 25, "set_const_at" => [Literal], fixed(2) => fixed(0), Sequential, [],
            /// find_const lit ; pop module, push its constant literals[lit]
            FindConst = 26, "find_const" => [Literal], fixed(1) => fixed(1), Sequential, [],
            /// attach_method lit ; pop receiver and method, attach as singleton method
            AttachMethod = 27, "attach_method" => [Literal], fixed(2) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// add_method lit ; pop module and method, add as instance method
            AddMethod = 28, "add_method" => [Literal], fixed(2) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// open_class lit ; pop superclass, open or create class literals[lit]
            OpenClass = 29, "open_class" => [Literal], fixed(1) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// open_class_under lit ; pop superclass and outer module, open the class under it
            OpenClassUnder = 30, "open_class_under" => [Literal], fixed(2) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// open_module lit ; open or create module literals[lit]
            OpenModule = 31, "open_module" => [Literal], fixed(0) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// open_module_under lit ; pop outer module, open the module under it
            OpenModuleUnder = 32, "open_module_under" => [Literal], fixed(1) => fixed(1), Sequential, [CHECK_INTERRUPTS],
            /// shift_tuple ; pop tuple, push rest and first element
            ShiftTuple = 33, "shift_tuple" => [], fixed(1) => fixed(2), Sequential, [],
            /// cast_tuple ; convert the top of stack to a tuple
            CastTuple = 34, "cast_tuple" => [], fixed(1) => fixed(1), Sequential, [],
            // =========================
            // Sends
            // =========================
            /// send_method lit ; send literals[lit] to the receiver without arguments
            SendMethod = 35, "send_method" => [Literal], fixed(1) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// send_stack lit, argc ; send with argc stacked arguments
            SendStack = 36, "send_stack" => [Literal, Int], scaled(1, Operand2, 1) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// send_stack_with_block lit, argc ; send with argc arguments and a block
            SendStackWithBlock = 37, "send_stack_with_block" => [Literal, Int], scaled(1, Operand2, 2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// send_stack_with_splat lit, argc ; send with argc arguments, a splat and a block
            SendStackWithSplat = 38, "send_stack_with_splat" => [Literal, Int], scaled(1, Operand2, 3) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// send_super_stack_with_block lit, argc ; super send with argc arguments and a block
            SendSuperStackWithBlock = 39, "send_super_stack_with_block" => [Literal, Int], scaled(1, Operand2, 1) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// send_super_stack_with_splat lit, argc ; super send with argc arguments and a splat
            SendSuperStackWithSplat = 40, "send_super_stack_with_splat" => [Literal, Int], scaled(1, Operand2, 2) => fixed(1), Send, [],
            /// push_block ; push the current block
            PushBlock = 41, "push_block" => [], fixed(0) => fixed(1), Sequential, [],
            /// clear_exception ; clear the current exception
            ClearException = 42, "clear_exception" => [], fixed(0) => fixed(0), Sequential, [],
            /// cast_array ; convert the top of stack to an array
            CastArray = 43, "cast_array" => [], fixed(1) => fixed(1), Sequential, [],
            /// raise_exc ; raise the current exception
            RaiseExc = 44, "raise_exc" => [], fixed(0) => fixed(0), Raise, [TERMINATOR],
            /// push_cpath_top ; push the top-level namespace
            PushCpathTop = 45, "push_cpath_top" => [], fixed(0) => fixed(1), Sequential, [],
            /// passed_arg n ; push whether argument n was passed
            PassedArg = 46, "passed_arg" => [Int], fixed(0) => fixed(1), Sequential, [],
            /// string_append ; pop two strings, push their concatenation
            StringAppend = 47, "string_append" => [], fixed(2) => fixed(1), Sequential, [],
            /// string_dup ; replace the top string with a copy
            StringDup = 48, "string_dup" => [], fixed(1) => fixed(1), Sequential, [],
            /// push_my_field idx ; push self.fields[idx]
            PushMyField = 49, "push_my_field" => [Field], fixed(0) => fixed(1), Sequential, [],
            /// store_my_field idx ; self.fields[idx] = top
            StoreMyField = 50, "store_my_field" => [Field], fixed(1) => fixed(1), Sequential, [],
            /// open_metaclass ; pop object, push its metaclass
            OpenMetaclass = 51, "open_metaclass" => [], fixed(1) => fixed(1), Sequential, [],
            /// push_local_depth depth, slot ; push a local of an enclosing scope
            PushLocalDepth = 52, "push_local_depth" => [Depth, BlockLocal], fixed(0) => fixed(1), Sequential, [],
            /// set_local_depth depth, slot ; set a local of an enclosing scope
            SetLocalDepth = 53, "set_local_depth" => [Depth, BlockLocal], fixed(1) => fixed(1), Sequential, [],
            /// locate_method ; pop name, include-private flag and receiver, push the method
            LocateMethod = 54, "locate_method" => [], fixed(3) => fixed(1), Sequential, [],
            /// kind_of ; pop class and object, push object.kind_of?(class)
            KindOf = 55, "kind_of" => [], fixed(2) => fixed(1), Sequential, [],
            /// instance_of ; pop class and object, push object.instance_of?(class)
            InstanceOf = 56, "instance_of" => [], fixed(2) => fixed(1), Sequential, [],
            /// set_call_flags flags ; set the flags of the next send
            SetCallFlags = 57, "set_call_flags" => [Int], fixed(0) => fixed(0), Sequential, [],
            /// yield_debugger ; hand control to the debugger
            YieldDebugger = 58, "yield_debugger" => [], fixed(0) => fixed(0), Sequential, [CHECK_INTERRUPTS],
            /// is_fixnum ; replace the top with whether it is a fixnum
            IsFixnum = 59, "is_fixnum" => [], fixed(1) => fixed(1), Sequential, [],
            /// is_symbol ; replace the top with whether it is a symbol
            IsSymbol = 60, "is_symbol" => [], fixed(1) => fixed(1), Sequential, [],
            /// is_nil ; replace the top with whether it is nil
            IsNil = 61, "is_nil" => [], fixed(1) => fixed(1), Sequential, [],
            /// class ; replace the top with its class
            Class = 62, "class" => [], fixed(1) => fixed(1), Sequential, [],
            /// equal ; pop two values, push identity equality
            Equal = 63, "equal" => [], fixed(2) => fixed(1), Sequential, [],
            /// set_literal lit ; literals[lit] = top
            SetLiteral = 64, "set_literal" => [Literal], fixed(0) => fixed(0), Sequential, [],
            /// passed_blockarg n ; push whether block argument n was passed
            PassedBlockarg = 65, "passed_blockarg" => [Int], fixed(0) => fixed(1), Sequential, [],
            /// create_block lit ; push a block for the compiled method literals[lit]
            CreateBlock = 66, "create_block" => [Literal], fixed(0) => fixed(1), Sequential, [],
            /// cast_for_single_block_arg ; unwrap a single block argument
            CastForSingleBlockArg = 67, "cast_for_single_block_arg" => [], fixed(1) => fixed(1), Sequential, [],
            /// cast_for_multi_block_arg ; spread block arguments
            CastForMultiBlockArg = 68, "cast_for_multi_block_arg" => [], fixed(1) => fixed(1), Sequential, [],
            /// check_serial lit, serial ; push whether the method's serial matches
            CheckSerial = 69, "check_serial" => [Literal, Int], fixed(1) => fixed(1), Sequential, [],
            // =========================
            // Meta opcodes (optimizations)
            // =========================
            /// meta_push_neg_1 ; push -1
            MetaPushNeg1 = 70, "meta_push_neg_1" => [], fixed(0) => fixed(1), Sequential, [],
            /// meta_push_0 ; push 0
            MetaPush0 = 71, "meta_push_0" => [], fixed(0) => fixed(1), Sequential, [],
            /// meta_push_1 ; push 1
            MetaPush1 = 72, "meta_push_1" => [], fixed(0) => fixed(1), Sequential, [],
            /// meta_push_2 ; push 2
            MetaPush2 = 73, "meta_push_2" => [], fixed(0) => fixed(1), Sequential, [],
            /// meta_send_op_plus ; a + b
            MetaSendOpPlus = 74, "meta_send_op_plus" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_minus ; a - b
            MetaSendOpMinus = 75, "meta_send_op_minus" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_equal ; a == b
            MetaSendOpEqual = 76, "meta_send_op_equal" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_lt ; a < b
            MetaSendOpLt = 77, "meta_send_op_lt" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_gt ; a > b
            MetaSendOpGt = 78, "meta_send_op_gt" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_tequal ; a === b
            MetaSendOpTequal = 79, "meta_send_op_tequal" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_op_nequal ; a != b
            MetaSendOpNequal = 80, "meta_send_op_nequal" => [], fixed(2) => fixed(1), Send, [CHECK_INTERRUPTS],
            /// meta_send_call argc ; call the receiver with argc arguments
            MetaSendCall = 81, "meta_send_call" => [Int], scaled(1, Operand1, 1) => fixed(1), Send, [],
            /// push_scope ; push the current static scope
            PushScope = 82, "push_scope" => [], fixed(0) => fixed(1), Sequential, [],
            /// add_scope ; pop module, push it as a new static scope
            AddScope = 83, "add_scope" => [], fixed(1) => fixed(0), Sequential, [],
            /// rotate n ; reverse the order of the top n values
            Rotate = 84, "rotate" => [Int], fixed(0) => fixed(0), Sequential, [],
            /// shift_array ; pop array, push rest and first element
            ShiftArray = 85, "shift_array" => [], fixed(1) => fixed(2), Sequential, [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (@unit $x:ident) => { () };

    (
        $(
            $(#[$doc:meta])*
            $name:ident = $id:expr, $mnemonic:literal => [ $( $kind:ident ),* $(,)? ],
            $consumed:expr => $produced:expr, $flow:ident, [ $( $flag:ident ),* $(,)? ]
        ),* $(,)?
    ) => {
        /// VM opcode. The discriminant is the persisted id.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $id,
            )*
        }

        /// Number of opcodes in the table.
        pub const OPCODE_COUNT: usize = <[()]>::len(&[ $( define_instructions!(@unit $name) ),* ]);

        /// Dense descriptor table; `OPCODES[id]` describes the opcode with that id.
        pub static OPCODES: [OpcodeDescriptor; OPCODE_COUNT] = [
            $(
                OpcodeDescriptor {
                    opcode: Opcode::$name,
                    mnemonic: $mnemonic,
                    operands: &[ $( OperandKind::$kind ),* ],
                    consumed: $consumed,
                    produced: $produced,
                    flow: Flow::$flow,
                    flags: Flags::NONE $( .with(Flags::$flag) )*,
                },
            )*
        ];

        impl Opcode {
            /// Looks up an opcode by its persisted id.
            pub fn from_id(id: u64) -> Result<Self, BytecodeError> {
                match id {
                    $( x if x == $id => Ok(Opcode::$name), )*
                    _ => Err(BytecodeError::InvalidOpcode { opcode: id }),
                }
            }

            /// Looks up an opcode by its mnemonic.
            pub fn from_mnemonic(name: &str) -> Result<Self, BytecodeError> {
                match name {
                    $( $mnemonic => Ok(Opcode::$name), )*
                    _ => Err(BytecodeError::InvalidMnemonic {
                        name: name.to_string(),
                    }),
                }
            }

            /// Returns the mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }
        }
    };
}

/// Effect of an instruction on the flow of execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flow {
    Sequential,
    Send,
    Goto,
    Return,
    Raise,
}

impl Flow {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Flow::Sequential => "sequential",
            Flow::Send => "send",
            Flow::Goto => "goto",
            Flow::Return => "return",
            Flow::Raise => "raise",
        }
    }
}

/// Execution flags forwarded to the interpreter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// The interpreter checks for pending interrupts after this instruction.
    pub const CHECK_INTERRUPTS: Flags = Flags(1 << 0);
    /// The instruction ends control flow.
    pub const TERMINATOR: Flags = Flags(1 << 1);

    /// Returns the union of both flag sets.
    pub const fn with(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Read-only view of one opcode table entry.
#[derive(Debug)]
pub struct OpcodeDescriptor {
    opcode: Opcode,
    mnemonic: &'static str,
    operands: &'static [OperandKind],
    consumed: StackEffect,
    produced: StackEffect,
    flow: Flow,
    flags: Flags,
}

impl OpcodeDescriptor {
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Persisted id of the opcode.
    pub const fn id(&self) -> u64 {
        self.opcode as u64
    }

    pub const fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// Operand kinds, in encoding order.
    pub const fn operands(&self) -> &'static [OperandKind] {
        self.operands
    }

    pub const fn arg_count(&self) -> usize {
        self.operands.len()
    }

    /// Words occupied in an instruction sequence (opcode plus operands).
    pub const fn width(&self) -> usize {
        1 + self.operands.len()
    }

    /// Raw consumed-count formula.
    pub const fn consumed(&self) -> StackEffect {
        self.consumed
    }

    /// Raw produced-count formula.
    pub const fn produced(&self) -> StackEffect {
        self.produced
    }

    pub const fn flow(&self) -> Flow {
        self.flow
    }

    pub const fn flags(&self) -> Flags {
        self.flags
    }

    pub const fn check_interrupts(&self) -> bool {
        self.flags.contains(Flags::CHECK_INTERRUPTS)
    }

    pub const fn is_terminator(&self) -> bool {
        self.flags.contains(Flags::TERMINATOR)
    }

    /// Whether nothing after this instruction is reachable by falling through.
    ///
    /// The decoder treats junk after such an instruction as allocator padding.
    pub const fn ends_flow(&self) -> bool {
        self.is_terminator() || matches!(self.flow, Flow::Return)
    }

    /// Stack slots consumed by this opcode with the given operands.
    pub fn stack_consumed(&self, operands: &[u64]) -> Result<u64, BytecodeError> {
        self.consumed.resolve(self.mnemonic, operands)
    }

    /// Stack slots produced by this opcode with the given operands.
    pub fn stack_produced(&self, operands: &[u64]) -> Result<u64, BytecodeError> {
        self.produced.resolve(self.mnemonic, operands)
    }

    /// Net change of the stack depth: produced minus consumed.
    pub fn stack_difference(&self, operands: &[u64]) -> Result<i64, BytecodeError> {
        let produced = self.stack_produced(operands)?;
        let consumed = self.stack_consumed(operands)?;
        let overflow = || BytecodeError::StackOverflow {
            mnemonic: self.mnemonic.to_string(),
        };
        let produced = i64::try_from(produced).map_err(|_| overflow())?;
        let consumed = i64::try_from(consumed).map_err(|_| overflow())?;
        Ok(produced - consumed)
    }
}

impl fmt::Display for OpcodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)
    }
}

for_each_instruction!(define_instructions);

impl Opcode {
    /// Returns the table entry for this opcode.
    pub fn descriptor(self) -> &'static OpcodeDescriptor {
        &OPCODES[self as usize]
    }

    /// Persisted id of the opcode.
    pub const fn id(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Looks up a descriptor by opcode id.
pub fn lookup(id: u64) -> Result<&'static OpcodeDescriptor, BytecodeError> {
    Opcode::from_id(id).map(Opcode::descriptor)
}

/// Looks up a descriptor by mnemonic.
pub fn lookup_mnemonic(name: &str) -> Result<&'static OpcodeDescriptor, BytecodeError> {
    Opcode::from_mnemonic(name).map(Opcode::descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_dense_and_ordered() {
        for (index, desc) in OPCODES.iter().enumerate() {
            assert_eq!(desc.id(), index as u64, "{} is out of place", desc.mnemonic());
        }
        assert_eq!(OPCODE_COUNT, 86);
    }

    #[test]
    fn lookup_by_id_and_mnemonic_agree() {
        for desc in OPCODES.iter() {
            assert_eq!(lookup(desc.id()).unwrap().opcode(), desc.opcode());
            assert_eq!(lookup_mnemonic(desc.mnemonic()).unwrap().opcode(), desc.opcode());
        }
    }

    #[test]
    fn lookup_unknown_id() {
        assert!(matches!(
            lookup(OPCODE_COUNT as u64),
            Err(BytecodeError::InvalidOpcode { opcode: 86 })
        ));
        assert!(matches!(
            Opcode::from_id(u64::MAX),
            Err(BytecodeError::InvalidOpcode { .. })
        ));
    }

    #[test]
    fn lookup_unknown_mnemonic() {
        assert!(matches!(
            lookup_mnemonic("push_everything"),
            Err(BytecodeError::InvalidMnemonic { ref name }) if name == "push_everything"
        ));
        assert!(lookup_mnemonic("PUSH_INT").is_err());
    }

    #[test]
    fn widths_follow_operand_lists() {
        assert_eq!(Opcode::Noop.descriptor().width(), 1);
        assert_eq!(Opcode::PushInt.descriptor().width(), 2);
        assert_eq!(Opcode::SendStack.descriptor().width(), 3);
        assert_eq!(
            Opcode::PushLocalDepth.descriptor().operands(),
            &[OperandKind::Depth, OperandKind::BlockLocal]
        );
    }

    #[test]
    fn fixed_stack_differences() {
        let cases: &[(Opcode, i64)] = &[
            (Opcode::Noop, 0),
            (Opcode::PushNil, 1),
            (Opcode::PushTrue, 1),
            (Opcode::PushFalse, 1),
            (Opcode::PushInt, 1),
            (Opcode::PushContext, 1),
            (Opcode::PushLiteral, 1),
            (Opcode::PushSelf, 1),
            (Opcode::Goto, 0),
            (Opcode::GotoIfFalse, -1),
            (Opcode::GotoIfTrue, -1),
            (Opcode::GotoIfDefined, -1),
            (Opcode::Ret, 0),
            (Opcode::Halt, 0),
            (Opcode::SwapStack, 0),
            (Opcode::DupTop, 1),
            (Opcode::Pop, -1),
            (Opcode::SetLocal, 0),
            (Opcode::PushLocal, 1),
            (Opcode::PushException, 1),
            (Opcode::SetIvar, 0),
            (Opcode::PushIvar, 1),
            (Opcode::PushConst, 1),
            (Opcode::SetConst, 0),
            (Opcode::SetConstAt, -2),
            (Opcode::FindConst, 0),
            (Opcode::AttachMethod, -1),
            (Opcode::AddMethod, -1),
            (Opcode::OpenClass, 0),
            (Opcode::OpenClassUnder, -1),
            (Opcode::OpenModule, 1),
            (Opcode::OpenModuleUnder, 0),
            (Opcode::ShiftTuple, 1),
            (Opcode::CastTuple, 0),
            (Opcode::SendMethod, 0),
            (Opcode::PushBlock, 1),
            (Opcode::ClearException, 0),
            (Opcode::CastArray, 0),
            (Opcode::RaiseExc, 0),
            (Opcode::PushCpathTop, 1),
            (Opcode::PassedArg, 1),
            (Opcode::StringAppend, -1),
            (Opcode::StringDup, 0),
            (Opcode::PushMyField, 1),
            (Opcode::StoreMyField, 0),
            (Opcode::OpenMetaclass, 0),
            (Opcode::PushLocalDepth, 1),
            (Opcode::SetLocalDepth, 0),
            (Opcode::LocateMethod, -2),
            (Opcode::KindOf, -1),
            (Opcode::InstanceOf, -1),
            (Opcode::SetCallFlags, 0),
            (Opcode::YieldDebugger, 0),
            (Opcode::IsFixnum, 0),
            (Opcode::IsSymbol, 0),
            (Opcode::IsNil, 0),
            (Opcode::Class, 0),
            (Opcode::Equal, -1),
            (Opcode::SetLiteral, 0),
            (Opcode::PassedBlockarg, 1),
            (Opcode::CreateBlock, 1),
            (Opcode::CastForSingleBlockArg, 0),
            (Opcode::CastForMultiBlockArg, 0),
            (Opcode::CheckSerial, 0),
            (Opcode::MetaPushNeg1, 1),
            (Opcode::MetaPush0, 1),
            (Opcode::MetaPush1, 1),
            (Opcode::MetaPush2, 1),
            (Opcode::MetaSendOpPlus, -1),
            (Opcode::MetaSendOpMinus, -1),
            (Opcode::MetaSendOpEqual, -1),
            (Opcode::MetaSendOpLt, -1),
            (Opcode::MetaSendOpGt, -1),
            (Opcode::MetaSendOpTequal, -1),
            (Opcode::MetaSendOpNequal, -1),
            (Opcode::PushScope, 1),
            (Opcode::AddScope, -1),
            (Opcode::Rotate, 0),
            (Opcode::ShiftArray, 1),
        ];
        let fixed_count = OPCODES
            .iter()
            .filter(|d| d.consumed().source().is_none() && d.produced().source().is_none())
            .count();
        assert_eq!(cases.len(), fixed_count);

        for (opcode, expected) in cases {
            let desc = opcode.descriptor();
            // Fixed effects ignore operand values.
            let operands = vec![7; desc.arg_count()];
            assert_eq!(desc.stack_difference(&operands).unwrap(), *expected, "{opcode}");
        }
    }

    #[test]
    fn make_array_scales_with_first_operand() {
        let desc = Opcode::MakeArray.descriptor();
        assert_eq!(desc.stack_consumed(&[3]).unwrap(), 3);
        assert_eq!(desc.stack_difference(&[3]).unwrap(), -2);
        assert_eq!(desc.stack_difference(&[0]).unwrap(), 1);
    }

    #[test]
    fn meta_send_call_counts_the_receiver() {
        let desc = Opcode::MetaSendCall.descriptor();
        assert_eq!(desc.stack_consumed(&[2]).unwrap(), 3);
        assert_eq!(desc.stack_difference(&[2]).unwrap(), -2);
    }

    #[test]
    fn sends_scale_with_second_operand() {
        let argc = 2;
        let cases = [
            (Opcode::SendStack, -2),
            (Opcode::SendStackWithBlock, -3),
            (Opcode::SendStackWithSplat, -4),
            (Opcode::SendSuperStackWithBlock, -2),
            (Opcode::SendSuperStackWithSplat, -3),
        ];
        for (opcode, expected) in cases {
            assert_eq!(
                opcode.descriptor().stack_difference(&[9, argc]).unwrap(),
                expected,
                "{opcode}"
            );
        }
    }

    #[test]
    fn no_opcode_depends_on_the_arg_register() {
        for desc in OPCODES.iter() {
            assert!(desc.consumed().is_static(), "{desc}");
            assert!(desc.produced().is_static(), "{desc}");
        }
    }

    #[test]
    fn flow_and_flags() {
        let ret = Opcode::Ret.descriptor();
        assert_eq!(ret.flow(), Flow::Return);
        assert!(ret.is_terminator());
        assert!(ret.ends_flow());

        let raise = Opcode::RaiseExc.descriptor();
        assert_eq!(raise.flow(), Flow::Raise);
        assert!(raise.ends_flow());

        let plus = Opcode::MetaSendOpPlus.descriptor();
        assert_eq!(plus.flow(), Flow::Send);
        assert!(plus.check_interrupts());
        assert!(!plus.ends_flow());

        assert_eq!(Opcode::Goto.descriptor().flow(), Flow::Goto);
        assert_eq!(Opcode::PushSelf.descriptor().flow(), Flow::Sequential);
        assert!(!Opcode::SendSuperStackWithSplat.descriptor().check_interrupts());
    }

    #[test]
    fn display_is_mnemonic() {
        assert_eq!(Opcode::MetaPushNeg1.to_string(), "meta_push_neg_1");
        assert_eq!(Opcode::Class.descriptor().to_string(), "class");
    }
}
