//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use memreceipt_core::{
    Action, FactInput, Fingerprint, Fingerprinter, KeyId, Keypair, Receipt, ReceiptFields,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random fingerprint.
pub fn fingerprint() -> impl Strategy<Value = Fingerprint> {
    any::<[u8; 32]>().prop_map(Fingerprint::from_bytes)
}

/// Generate an action.
pub fn action() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::Write), Just(Action::Search), Just(Action::Revoke)]
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate a versioned key id.
pub fn key_id() -> impl Strategy<Value = KeyId> {
    (1u64..=64).prop_map(|v| KeyId::versioned("key", v).expect("valid prefix"))
}

/// Generate a statement with at least one visible character.
pub fn statement() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ,.]{0,80}".prop_map(String::from)
}

/// Generate a tag.
pub fn tag() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a fact that canonicalizes successfully.
pub fn fact() -> impl Strategy<Value = FactInput> {
    (
        statement(),
        prop::collection::vec(tag(), 0..4),
        prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9 ]{0,16}", 0..3),
    )
        .prop_map(|(statement, tags, attributes): (String, Vec<String>, BTreeMap<String, String>)| {
            FactInput {
                statement,
                tags,
                attributes,
            }
        })
}

/// Parameters for generating a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptParams {
    pub keypair: Keypair,
    pub fact: FactInput,
    pub action: Action,
    pub timestamp: i64,
    pub key_id: KeyId,
}

impl Arbitrary for ReceiptParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (keypair(), fact(), action(), timestamp(), key_id())
            .prop_map(|(keypair, fact, action, timestamp, key_id)| ReceiptParams {
                keypair,
                fact,
                action,
                timestamp,
                key_id,
            })
            .boxed()
    }
}

/// Generate a receipt from parameters.
pub fn receipt_from_params(params: &ReceiptParams) -> Receipt {
    let fingerprint = Fingerprinter::new()
        .fingerprint(&params.fact)
        .expect("generated facts canonicalize");
    ReceiptFields {
        fingerprint,
        action: params.action,
        timestamp: params.timestamp,
        key_id: params.key_id.clone(),
    }
    .sign_with(&params.keypair)
}
