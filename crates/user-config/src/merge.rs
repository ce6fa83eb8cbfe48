use serde_json::Value;

/// Recursively merges `patch` into `target`.
///
/// Mappings merge key-wise; any other value type (scalar, list, null)
/// replaces the existing value in place. Keys absent from `patch` are left
/// untouched.
pub fn merge_documents(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(slot) if slot.is_object() && patch_value.is_object() => {
                        merge_documents(slot, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_maps_merge_key_wise() {
        let mut target = json!({"a": {"c": 2}});
        merge_documents(&mut target, &json!({"a": {"b": 1}}));
        assert_eq!(target, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn scalars_and_lists_replace() {
        let mut target = json!({"pairs": ["BTC/USDC"], "stake": 10});
        merge_documents(&mut target, &json!({"pairs": ["ETH/USDC"], "stake": 50}));
        assert_eq!(target, json!({"pairs": ["ETH/USDC"], "stake": 50}));
    }

    #[test]
    fn map_replaces_scalar_and_vice_versa() {
        let mut target = json!({"exchange": "hyperliquid"});
        merge_documents(&mut target, &json!({"exchange": {"name": "hyperliquid"}}));
        assert_eq!(target, json!({"exchange": {"name": "hyperliquid"}}));

        let mut target = json!({"exchange": {"name": "hyperliquid"}});
        merge_documents(&mut target, &json!({"exchange": "hyperliquid"}));
        assert_eq!(target, json!({"exchange": "hyperliquid"}));
    }

    #[test]
    fn untouched_siblings_survive_deep_merge() {
        let mut target = json!({"exchange": {"walletAddress": "0xabc", "pair_whitelist": ["BTC"]}});
        merge_documents(&mut target, &json!({"exchange": {"walletAddress": "0xdef"}}));
        assert_eq!(
            target,
            json!({"exchange": {"walletAddress": "0xdef", "pair_whitelist": ["BTC"]}})
        );
    }
}
