#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any message that decodes must re-encode, and the re-encoded frame must
    // decode back to the same message.
    if let Ok(message) = rota_protocol::decode(data) {
        let frame = rota_protocol::encode(&message).expect("decoded message re-encodes");
        let again = rota_protocol::decode(&frame[4..]).expect("re-encoded frame decodes");
        assert_eq!(again, message);
    }
});
