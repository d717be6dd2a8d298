#![no_main]

use libfuzzer_sys::fuzz_target;
extern crate bitcoin_script;

use bitcoin_script::{
    interpreter::{Flags, NullSignatureChecker},
    script::Code,
    verify,
};

fuzz_target!(|tup: (&[u8], &[u8], Vec<Vec<u8>>, u32)| {
    // `fuzz_target!` doesn’t support pattern matching in the parameter list.
    let (script_sig, script_pubkey, witness, flag_bits) = tup;
    let flags = Flags::from_bits_truncate(flag_bits);
    let script_sig = Code(script_sig.to_vec());
    let script_pubkey = Code(script_pubkey.to_vec());
    match verify::verify_script(
        &script_sig,
        &script_pubkey,
        &witness,
        flags,
        &NullSignatureChecker(),
    ) {
        // Inconsistent flags are rejected before anything is evaluated.
        Err(_) => assert!(verify::check_flags(flags).is_err()),
        Ok(_) => {
            let _ = verify::sig_op_count(&script_sig, &script_pubkey, &witness, flags);
        }
    }
});
