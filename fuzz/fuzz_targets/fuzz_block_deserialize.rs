#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Deserializing arbitrary JSON as ledger types must never panic, and
    // hashing whatever did parse must not either.
    if let Ok(block) = serde_json::from_slice::<rota_ledger::Block>(data) {
        let _ = block.compute_hash();
    }

    if let Ok(tx) = serde_json::from_slice::<rota_transactions::Transaction>(data) {
        let _ = tx.verify();
        let _ = tx.cost();
    }

    let _ = serde_json::from_slice::<rota_types::BlockHash>(data);
    let _ = serde_json::from_slice::<rota_types::Address>(data);
    let _ = serde_json::from_slice::<rota_types::Signature>(data);
});
