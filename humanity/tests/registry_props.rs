use poha_humanity::{HumanityError, HumanityRegistry, RegistryConfig};
use poha_types::Address;
use proptest::prelude::*;

proptest! {
    #[test]
    fn completion_rejects_any_other_token(addr in "[a-zA-Z0-9_]{1,40}", guess in ".{0,80}") {
        let registry = HumanityRegistry::new(RegistryConfig::default());
        let address = Address::from(addr);
        let token = registry.register_verification(&address);
        prop_assume!(guess != token);

        let result = registry.complete_verification(&address, &guess);
        prop_assert!(matches!(result, Err(HumanityError::TokenMismatch(_))));
        prop_assert!(!registry.is_human_verified(&address));
    }

    #[test]
    fn only_latest_token_completes(addr in "[a-z]{1,20}", rounds in 2usize..5) {
        let registry = HumanityRegistry::new(RegistryConfig::default());
        let address = Address::from(addr);
        let tokens: Vec<String> = (0..rounds)
            .map(|_| registry.register_verification(&address))
            .collect();

        for stale in &tokens[..rounds - 1] {
            prop_assert!(registry.complete_verification(&address, stale).is_err());
        }
        prop_assert!(registry.complete_verification(&address, &tokens[rounds - 1]).is_ok());
        prop_assert!(registry.is_human_verified(&address));
    }
}
