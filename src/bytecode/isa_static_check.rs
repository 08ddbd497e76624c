#[cfg(test)]
mod tests {
    use crate::bytecode::operand::StackSource::{Operand1, Operand2};
    use crate::bytecode::operand::{StackEffect, fixed, scaled};

    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    const EXPECTED_ISA_HASH: u64 = 12962218040802514910;

    fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
        for b in bytes {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    /// Tag, source, multiplier and constant of a stack-effect formula.
    fn effect_bytes(effect: StackEffect) -> [u8; 4] {
        match effect {
            StackEffect::Fixed(n) => [0, n as u8, 0, 0],
            StackEffect::ScaledBy {
                source,
                multiplier,
                constant,
            } => [1, source as u8, multiplier as u8, constant as u8],
        }
    }

    macro_rules! hash_isa {
        (
            $(
                $(#[$doc:meta])*
                $name:ident = $id:expr, $mnemonic:literal => [ $( $kind:ident ),* $(,)? ],
                $consumed:expr => $produced:expr, $flow:ident, [ $( $flag:ident ),* $(,)? ]
            ),* $(,)?
        ) => {{
            let mut h = FNV_OFFSET;
            $(
                h = fnv1a64(h, stringify!($name).as_bytes());
                h = fnv1a64(h, &[crate::bytecode::isa::Opcode::$name as u8]);
                h = fnv1a64(h, $mnemonic.as_bytes());
                $( h = fnv1a64(h, stringify!($kind).as_bytes()); )*
                h = fnv1a64(h, &effect_bytes($consumed));
                h = fnv1a64(h, &effect_bytes($produced));
                h = fnv1a64(h, stringify!($flow).as_bytes());
                $( h = fnv1a64(h, stringify!($flag).as_bytes()); )*
            )*
            h
        }};
    }

    fn current_isa_hash() -> u64 {
        crate::for_each_instruction!(hash_isa)
    }

    #[test]
    #[ignore]
    fn print_isa_hash() {
        println!("ISA_HASH={}", current_isa_hash());
    }

    #[test]
    fn stack_formulas_feed_the_hash() {
        assert_ne!(
            effect_bytes(scaled(1, Operand2, 1)),
            effect_bytes(scaled(1, Operand2, 2))
        );
        assert_ne!(
            effect_bytes(scaled(1, Operand1, 1)),
            effect_bytes(scaled(1, Operand2, 1))
        );
        assert_ne!(effect_bytes(fixed(1)), effect_bytes(fixed(2)));
    }

    #[test]
    fn isa_hash_unchanged() {
        assert_eq!(current_isa_hash(), EXPECTED_ISA_HASH);
    }
}
