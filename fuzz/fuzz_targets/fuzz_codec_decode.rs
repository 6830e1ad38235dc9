#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes through the length-prefixed frame reader. It must
    // return a message, a clean EOF, or an error, never panic.
    let rt = match tokio_runtime() {
        Some(rt) => rt,
        None => return,
    };
    rt.block_on(async {
        let mut reader = data;
        while let Ok(Some(_)) = rota_protocol::read_frame(&mut reader).await {}
    });
});

fn tokio_runtime() -> Option<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().build().ok()
}
