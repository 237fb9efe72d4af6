use proptest::prelude::*;

use poha_types::{Address, Block, BlockHash, Timestamp, Transaction, TxHash};

proptest! {
    /// BlockHash hex roundtrip through Display / FromStr.
    #[test]
    fn block_hash_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let parsed: BlockHash = hash.to_string().parse().unwrap();
        prop_assert_eq!(parsed, hash);
    }

    /// TxHash::is_zero is true only for all-zero bytes.
    #[test]
    fn tx_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Any change to the human proof changes the block hash.
    #[test]
    fn block_hash_binds_human_proof(a in "[a-f0-9]{1,64}", b in "[a-f0-9]{1,64}") {
        prop_assume!(a != b);
        let ba = Block::unsigned(7, BlockHash::ZERO, Timestamp::new(9), vec![], Address::from("V1"), a);
        let bb = Block::unsigned(7, BlockHash::ZERO, Timestamp::new(9), vec![], Address::from("V1"), b);
        prop_assert_ne!(ba.hash, bb.hash);
    }

    /// Transaction ids survive JSON transport.
    #[test]
    fn transaction_json_keeps_valid_id(value in any::<u64>(), ts in any::<u64>(), memo in proptest::option::of("[ -~]{0,32}")) {
        let tx = Transaction::new(Address::from("from"), Address::from("to"), value, memo, Timestamp::new(ts));
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        prop_assert!(back.has_valid_id());
        prop_assert_eq!(back, tx);
    }
}
