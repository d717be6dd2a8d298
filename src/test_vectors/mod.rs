//! Script and transaction vectors shared by the tests of several modules.

use alloc::{string::String, vec::Vec};

use hex::FromHex;

use crate::{
    interpreter::{self, Flags, NullSignatureChecker},
    opcode::{self, Disabled},
    pv,
    script::{self, Code},
    tx::{OutPoint, Transaction, TxIn, TxOut},
    Opcode,
};

/// A shorthand syntax for writing possibly-incorrect scripts.
#[derive(Debug)]
pub enum Entry {
    /// An Opcode
    O(Opcode),
    /// A byte sequence encoded as a hex string
    H(&'static str),
    /// A PushValue encoded as an ASCII string
    A(&'static str),
    /// A PushValue encoded as a number
    N(i64),
}

impl Entry {
    fn serialize(&self) -> Vec<u8> {
        match self {
            Entry::O(opcode) => opcode.into(),
            Entry::H(bytes) => Vec::from_hex(bytes).expect("vectors hold valid hex"),
            Entry::A(string) => (&pv::push_value(string.as_bytes()).expect("short string")).into(),
            Entry::N(num) => (&pv::push_num(*num)).into(),
        }
    }

    /// Concatenate the encodings of a sequence of entries.
    pub fn script(entries: &[Entry]) -> Vec<u8> {
        entries.iter().flat_map(Entry::serialize).collect()
    }
}

/// A script pair run without a transaction, so every signature check fails and lock time checks
/// are unsatisfied.
#[derive(Debug)]
pub struct TestVector {
    /// Describes what the vector checks.
    pub comment: &'static str,
    /// The script sig.
    pub script_sig: Vec<Entry>,
    /// The script pubkey.
    pub script_pubkey: Vec<Entry>,
    /// The rules to verify under.
    pub flags: Flags,
    /// The expected outcome. The failing opcode isn’t compared.
    pub result: Result<bool, script::Error>,
}

impl TestVector {
    /// Errors identify the failing opcode, which the vectors leave out.
    fn normalize(err: script::Error) -> script::Error {
        match err {
            script::Error::Interpreter(_, e) => script::Error::Interpreter(None, e),
            e => e,
        }
    }

    /// A successful run is uninteresting, but a failure returns the actual result in `Err`.
    pub fn run(&self) -> Result<(), Result<bool, script::Error>> {
        let res = script::Raw::from_raw_parts(
            Entry::script(&self.script_sig),
            Entry::script(&self.script_pubkey),
        )
        .eval(self.flags, &NullSignatureChecker())
        .map_err(|(_, e)| Self::normalize(e));
        if res == self.result {
            Ok(())
        } else {
            Err(res)
        }
    }
}

fn interpreter_error(e: interpreter::Error) -> Result<bool, script::Error> {
    Err(script::Error::Interpreter(None, e))
}

/// Scripts covering the interpreter’s basic rules.
pub fn test_vectors() -> Vec<TestVector> {
    use crate::op::*;
    use Entry::*;

    let p2sh = Flags::P2SH | Flags::StrictEnc;
    let tv = |comment, script_sig, script_pubkey, flags, result| TestVector {
        comment,
        script_sig,
        script_pubkey,
        flags,
        result,
    };

    vec![
        tv("true is true", vec![N(1)], vec![], p2sh, Ok(true)),
        tv("empty stack is false", vec![], vec![], p2sh, Ok(false)),
        tv("zero is false", vec![N(0)], vec![], p2sh, Ok(false)),
        tv(
            "negative zero is false",
            vec![H("0180")],
            vec![],
            p2sh,
            Ok(false),
        ),
        tv(
            "depth of an empty stack",
            vec![],
            vec![O(DEPTH), O(_0), O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "equalverify then equal",
            vec![O(_1), O(_2)],
            vec![O(_2), O(EQUALVERIFY), O(_1), O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "string pushes compare by value",
            vec![A("Az")],
            vec![A("Az"), O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "inequality leaves false",
            vec![N(1)],
            vec![N(2), O(EQUAL)],
            p2sh,
            Ok(false),
        ),
        tv(
            "taken branch",
            vec![N(1)],
            vec![O(IF), O(_1), O(ELSE), O(_0), O(ENDIF)],
            p2sh,
            Ok(true),
        ),
        tv(
            "return in an untaken branch",
            vec![N(0)],
            vec![O(IF), O(RETURN), O(ENDIF), O(_1)],
            p2sh,
            Ok(true),
        ),
        tv(
            "return in a taken branch",
            vec![N(1)],
            vec![O(IF), O(RETURN), O(ENDIF)],
            p2sh,
            interpreter_error(interpreter::Error::OpReturn),
        ),
        tv(
            "endif without if",
            vec![N(1)],
            vec![O(ENDIF)],
            p2sh,
            interpreter_error(interpreter::Error::UnbalancedConditional),
        ),
        tv(
            "if without endif",
            vec![N(1), N(1)],
            vec![O(IF)],
            p2sh,
            Err(script::Error::UnclosedConditional(1)),
        ),
        tv(
            "disabled opcodes fail in untaken branches",
            vec![N(1)],
            vec![O(_0), O(IF), H("7e"), O(ENDIF)],
            p2sh,
            Err(script::Error::Opcode(opcode::Error::Disabled(
                Disabled::OP_CAT,
            ))),
        ),
        tv(
            "unknown opcodes only fail when executed",
            vec![N(0)],
            vec![O(IF), H("bb"), O(ENDIF), O(_1)],
            p2sh,
            Ok(true),
        ),
        tv(
            "unknown opcode executed",
            vec![N(1)],
            vec![O(IF), H("bb"), O(ENDIF), O(_1)],
            p2sh,
            interpreter_error(interpreter::Error::BadOpcode),
        ),
        tv(
            "OP_VERIF fails even in untaken branches",
            vec![N(0)],
            vec![O(IF), H("65"), O(ENDIF), O(_1)],
            p2sh,
            interpreter_error(interpreter::Error::BadOpcode),
        ),
        tv(
            "addition",
            vec![],
            vec![N(2), N(3), O(ADD), N(5), O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "within is half open",
            vec![],
            vec![N(0), N(0), N(1), O(WITHIN)],
            p2sh,
            Ok(true),
        ),
        tv(
            "hash160 of the empty string",
            vec![],
            vec![
                O(_0),
                O(HASH160),
                H("14b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"),
                O(EQUAL),
            ],
            p2sh,
            Ok(true),
        ),
        tv(
            "sha256 of the empty string",
            vec![],
            vec![
                O(_0),
                O(SHA256),
                H("20e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"),
                O(EQUAL),
            ],
            p2sh,
            Ok(true),
        ),
        tv(
            "size leaves its operand",
            vec![A("abc")],
            vec![O(SIZE), N(3), O(EQUALVERIFY), A("abc"), O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "non-minimal zero is a number without MINIMALDATA",
            vec![H("0100")],
            vec![O(NOT)],
            p2sh,
            Ok(true),
        ),
        tv(
            "0-of-0 multisig",
            vec![N(0)],
            vec![O(_0), O(_0), O(CHECKMULTISIG)],
            p2sh,
            Ok(true),
        ),
        tv(
            "multisig dummy must be empty under NULLDUMMY",
            vec![N(1)],
            vec![O(_0), O(_0), O(CHECKMULTISIG)],
            Flags::NullDummy,
            interpreter_error(interpreter::Error::SigNullDummy),
        ),
        tv(
            "CLTV is a NOP without its flag",
            vec![],
            vec![N(-1), O(CHECKLOCKTIMEVERIFY)],
            p2sh,
            Ok(true),
        ),
        tv(
            "CLTV rejects negative lock times",
            vec![],
            vec![N(-1), O(CHECKLOCKTIMEVERIFY)],
            Flags::CHECKLOCKTIMEVERIFY,
            interpreter_error(interpreter::Error::NegativeLockTime),
        ),
        tv(
            "CLTV without a transaction",
            vec![],
            vec![N(0), O(CHECKLOCKTIMEVERIFY)],
            Flags::CHECKLOCKTIMEVERIFY,
            interpreter_error(interpreter::Error::UnsatisfiedLockTime),
        ),
        tv(
            "upgradable NOPs are allowed by default",
            vec![N(1)],
            vec![O(NOP1), O(NOP10)],
            p2sh,
            Ok(true),
        ),
        tv(
            "upgradable NOPs can be discouraged",
            vec![N(1)],
            vec![O(NOP10)],
            Flags::DiscourageUpgradableNOPs,
            interpreter_error(interpreter::Error::DiscourageUpgradableNOPs),
        ),
        tv(
            "non-push script sig",
            vec![N(1), O(DUP)],
            vec![O(EQUAL)],
            Flags::SigPushOnly,
            Err(script::Error::SigPushOnly),
        ),
        tv(
            "non-push script sig without SIGPUSHONLY",
            vec![N(1), O(DUP)],
            vec![O(EQUAL)],
            p2sh,
            Ok(true),
        ),
        tv(
            "clean stack",
            vec![N(1), N(1)],
            vec![],
            Flags::P2SH | Flags::Witness | Flags::CleanStack,
            Err(script::Error::CleanStack),
        ),
    ]
}

struct Reader(Vec<u8>, usize);

impl Reader {
    fn from_hex(hex: &str) -> Self {
        Reader(Vec::from_hex(hex).expect("valid hex"), 0)
    }
    fn take(&mut self, n: usize) -> &[u8] {
        let start = self.1;
        self.1 += n;
        &self.0[start..self.1]
    }
    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take(4).try_into().expect("4 bytes"))
    }
    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take(8).try_into().expect("8 bytes"))
    }
    fn compact_size(&mut self) -> usize {
        match self.take(1)[0] {
            0xfd => u16::from_le_bytes(self.take(2).try_into().expect("2 bytes")).into(),
            0xfe => self.u32() as usize,
            0xff => self.i64() as usize,
            n => n.into(),
        }
    }
    fn bytes(&mut self) -> Vec<u8> {
        let len = self.compact_size();
        self.take(len).to_vec()
    }
    fn tx_outs(&mut self) -> Vec<TxOut> {
        (0..self.compact_size())
            .map(|_| TxOut {
                value: self.i64(),
                script_pubkey: Code(self.bytes()),
            })
            .collect()
    }
    fn finish(&self) {
        assert_eq!(self.1, self.0.len(), "trailing bytes");
    }
}

/// Decode a transaction in the network serialization, with or without witnesses.
///
/// # Panics
///
/// On malformed input. This is only for fixtures.
pub fn decode_tx(tx_hex: &str) -> Transaction {
    let mut r = Reader::from_hex(tx_hex);
    let version = r.u32() as i32;
    let has_witness = r.0[r.1] == 0;
    if has_witness {
        assert_eq!(r.take(2), [0x00, 0x01]);
    }
    let mut inputs: Vec<TxIn> = (0..r.compact_size())
        .map(|_| TxIn {
            prevout: OutPoint {
                txid: r.take(32).try_into().expect("32 bytes"),
                vout: r.u32(),
            },
            script_sig: Code(r.bytes()),
            sequence: r.u32(),
            witness: vec![],
        })
        .collect();
    let outputs = r.tx_outs();
    if has_witness {
        for input in &mut inputs {
            input.witness = (0..r.compact_size()).map(|_| r.bytes()).collect();
        }
    }
    let lock_time = r.u32();
    r.finish();
    Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    }
}

/// Decode a count-prefixed list of serialized outputs, the way the outputs spent by a
/// transaction are usually written down next to it.
///
/// # Panics
///
/// On malformed input.
pub fn decode_tx_outs(hex: &str) -> Vec<TxOut> {
    let mut r = Reader::from_hex(hex);
    let outs = r.tx_outs();
    r.finish();
    outs
}

/// BIP143 “native P2WPKH” example, unsigned. Input 1 spends 6 BTC from a P2WPKH output.
pub const BIP143_NATIVE_P2WPKH_TX: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";

/// BIP143 “P2SH-P2WPKH” example, unsigned. The input spends 10 BTC.
pub const BIP143_P2SH_P2WPKH_TX: &str = "0100000001db6b1b20aa0fd7b23880be2ecbd4a98130974cf4748fb66092ac4d3ceb1a54770100000000feffffff02b8b4eb0b000000001976a914a457b684d7f0d539a46a45bbc043f35b59d0d96388ac0008af2f000000001976a914fd270b1ee6abcaea97fea7ad0402e8bd8ad6d77c88ac92040000";

/// BIP143 6-of-6 “P2SH-P2WSH” example, unsigned. The input spends 9.87654321 BTC.
pub const BIP143_P2SH_P2WSH_TX: &str = "010000000136641869ca081e70f394c6948e8af409e18b619df2ed74aa106c1ca29787b96e0100000000ffffffff0200e9a435000000001976a914389ffce9cd9ae88dcc0631e88a821ffdbe9bfe2688acc0832f05000000001976a9147480a33f950689af511e6e84c138dbbd3c3ee41588ac00000000";

/// The witness script of [`BIP143_P2SH_P2WSH_TX`].
pub const BIP143_P2SH_P2WSH_WITNESS_SCRIPT: &str = "56210307b8ae49ac90a048e9b53357a2354b3334e9c8bee813ecb98e99a7e07e8c3ba32103b28f0c28bfab54554ae8c658ac5c3e0ce6e79ad336331f78c428dd43eea8449b21034b8113d703413d57761b8b9781957b8c0ac1dfe69f492580ca4195f50376ba4a21033400f6afecb833092a9a21cfdf1ed1376e58c5d1f47de74683123987e967a8f42103a6d48b1131e94ba04d9737d61acdaa1322008af9602b3b14862c07a1789aac162102d8b661b0b3302ee2f162b09e07a55ad5dfbe673a9f01d9f0c19617681024306b56ae";

/// The signature hash of [`BIP143_P2SH_P2WSH_TX`] for each hash type its six keys sign with.
pub const BIP143_P2SH_P2WSH_SIGHASHES: [(u8, &str); 6] = [
    (
        0x01,
        "185c0be5263dce5b4bb50a047973c1b6272bfbd0103a89444597dc40b248ee7c",
    ),
    (
        0x02,
        "e9733bc60ea13c95c6527066bb975a2ff29a925e80aa14c213f686cbae5d2f36",
    ),
    (
        0x03,
        "1e1f1c303dc025bd664acb72e583e933fae4cff9148bf78c157d1e8f78530aea",
    ),
    (
        0x81,
        "2a67f03e63a6a422125878b40b82da593be8d4efaafe88ee528af6e5a9955c6e",
    ),
    (
        0x82,
        "781ba15f3779d5542ce8ecb5c18716733a5ee42a6f51488ec96154934e2c890a",
    ),
    (
        0x83,
        "511e8e52ed574121fc1b654970395502128263f62662e076dc6baf05c2e6a99b",
    ),
];

/// A BIP341 signature hash, computed by Bitcoin Core’s functional test framework for a random
/// transaction.
#[derive(Clone, Copy, Debug)]
pub struct TaprootSighashVector {
    /// The spending transaction.
    pub tx: &'static str,
    /// The outputs spent by every input, for [`decode_tx_outs`].
    pub spent: &'static str,
    /// The input being signed.
    pub input_index: usize,
    /// The raw hash type byte.
    pub hash_type: u8,
    /// The annex, without its compact-size length.
    pub annex: Option<&'static str>,
    /// The executing tapscript, for script path spends. Its leaf version is `0xc0`, and no
    /// `OP_CODESEPARATOR` has executed.
    pub tapscript: Option<&'static str>,
    /// The expected signature hash.
    pub sighash: &'static str,
}

/// Key path spends with every hash type, then spends that commit to an annex and to a leaf.
pub const TAPROOT_SIGHASHES: [TaprootSighashVector; 9] = [
    TaprootSighashVector {
        tx: "020000000164eb050a5e3da0c2a65e4786f26d753b7bc69691fabccafb11f7acef36641f1846010000003101b2b404392a22000000000017a9147f2bde86fe78bf68a0544a4f290e12f0b7e0a08c87580200000000000017a91425d11723074ecfb96a0a83c3956bfaf362ae0c908758020000000000001600147e20f938993641de67bb0cdd71682aa34c4d29ad5802000000000000160014c64984dc8761acfa99418bd6bedc79b9287d652d72000000",
        spent: "01365724000000000023542156b39dab4f8f3508e0432cfb41fab110170acaa2d4c42539cb90a4dc7c093bc500",
        input_index: 0,
        hash_type: 0x00,
        annex: None,
        tapscript: None,
        sighash: "33ca0ebfb4a945eeee9569fc0f5040221275f88690b7f8592ada88ce3bdf6703",
    },
    TaprootSighashVector {
        tx: "0200000002fff49be59befe7566050737910f6ccdc5e749c7f8860ddc140386463d88c5ad0f3000000002cf68eb4a3d67f9d4c079249f7e4f27b8854815cb1ed13842d4fbf395f9e217fd605ee24090100000065235d9203f458520000000000160014b6d48333bb13b4c644e57c43a9a26df3a44b785e58020000000000001976a914eea9461a9e1e3f765d3af3e726162e0229fe3eb688ac58020000000000001976a9143a8869c9f2b5ea1d4ff3aeeb6a8fb2fffb1ad5fe88ac0ad7125c",
        spent: "02591f220000000000225120f25ad35583ea31998d968871d7de1abd2a52f6fe4178b54ea158274806ff4ece48fb310000000000225120f25ad35583ea31998d968871d7de1abd2a52f6fe4178b54ea158274806ff4ece",
        input_index: 1,
        hash_type: 0x01,
        annex: None,
        tapscript: None,
        sighash: "626ab955d58c9a8a600a0c580549d06dc7da4e802eb2a531f62a588e430967a8",
    },
    TaprootSighashVector {
        tx: "0200000001350005f65aa830ced2079df348e2d8c2bdb4f10e2dde6a161d8a07b40d1ad87dae000000001611d0d603d9dc0e000000000017a914459b6d7d6bbb4d8837b4bf7e9a4556f952da2f5c8758020000000000001976a9141dd70e1299ffc2d5b51f6f87de9dfe9398c33cbb88ac58020000000000001976a9141dd70e1299ffc2d5b51f6f87de9dfe9398c33cbb88aca71c1f4f",
        spent: "01c4811000000000002251201bf9297d0a2968ae6693aadd0fa514717afefd218087a239afb7418e2d22e65c",
        input_index: 0,
        hash_type: 0x81,
        annex: None,
        tapscript: None,
        sighash: "dfa9437f9c9a1d1f9af271f79f2f5482f287cdb0d2e03fa92c8a9b216cc6061c",
    },
    TaprootSighashVector {
        tx: "020000000185bed1a6da2bffbd60ec681a1bfb71c5111d6395b99b3f8b2bf90167111bcb18f5010000007c83ace802ded24a00000000001600142c4698f9f7a773866879755aa78c516fb332af8e5802000000000000160014d38639dfbac4259323b98a472405db0c461b31fa61073747",
        spent: "0144c84d0000000000225120e3f2107989c88e67296ab2faca930efa2e3a5bd3ff0904835a11c9e807458621",
        input_index: 0,
        hash_type: 0x02,
        annex: None,
        tapscript: None,
        sighash: "3129de36a5d05fff97ffca31eb75fcccbbbc27b3147a7a36a9e4b45d8b625067",
    },
    TaprootSighashVector {
        tx: "eb93dbb901028c8515589dac980b6e7f8e4088b77ed866ca0d6d210a7218b6fd0f6b22dd6d7300000000eb4740a9047efc0e0000000000160014913da2128d8fcf292b3691db0e187414aa1783825802000000000000160014913da2128d8fcf292b3691db0e187414aa178382580200000000000017a9143dd27f01c6f7ef9bb9159937b17f17065ed01a0c875802000000000000160014d7630e19df70ada9905ede1722b800c0005f246641000000",
        spent: "013fed110000000000225120eb536ae8c33580290630fc495046e998086a64f8f33b93b07967d9029b265c55",
        input_index: 0,
        hash_type: 0x82,
        annex: None,
        tapscript: None,
        sighash: "2441e8b0e063a2083ee790f14f2045022f07258ddde5ee01de543c9e789d80ae",
    },
    TaprootSighashVector {
        tx: "02000000017836b409a5fed32211407e44b971591f2032053f14701fb5b3a30c0ff382f2cc9c0100000061ac55f60288fb5600000000001976a9144ea02f6f182b082fb6ce47e36bbde390b6a41b5088ac58020000000000001976a9144ea02f6f182b082fb6ce47e36bbde390b6a41b5088ace4000000",
        spent: "01efa558000000000022512007071ea3dc7e331b0687d0193d1e6d6ed10e645ef36f10ef8831d5e522ac9e80",
        input_index: 0,
        hash_type: 0x03,
        annex: None,
        tapscript: None,
        sighash: "30239345177cadd0e3ea413d49803580abb6cb27971b481b7788a78d35117a88",
    },
    TaprootSighashVector {
        tx: "0100000001aa6deae89d5e0aaca58714fc76ef6f3c8284224888089232d4e663843ed3ab3eae010000008b6657a60450cb4c0000000000160014a3d42b5413ef0c0701c4702f3cd7d4df222c147058020000000000001976a91430b4ed8723a4ee8992aa2c8814cfe5c3ad0ab9d988ac5802000000000000160014365b1166a6ed0a5e8e9dff17a6d00bbb43454bc758020000000000001976a914bc98c51a84fe7fad5dc380eb8b39586eff47241688ac4f313247",
        spent: "0107af4e00000000002251202c36d243dfc06cb56a248e62df27ecba7417307511a81ae61aa41c597a929c69",
        input_index: 0,
        hash_type: 0x83,
        annex: None,
        tapscript: None,
        sighash: "bf9c83f26c6dd16449e4921f813f551c4218e86f2ec906ca8611175b41b566df",
    },
    TaprootSighashVector {
        tx: "0200000001df8123752e8f37d132c4e9f1ff7e4f9b986ade9211267e9ebd5fd22a5e718dec6d01000000ce4023b903cb7b23000000000017a914a18b36ea7a094db2f4940fc09edf154e86de7bd787580200000000000017a914afd0d512a2c5c2b40e25669e9cc460303c325b8b87580200000000000017a914a18b36ea7a094db2f4940fc09edf154e86de7bd787f6020000",
        spent: "01ea49260000000000225120ab5e9800806bf18cb246edcf5fe63441208fe955a4b5a35bbff65f5db622a010",
        input_index: 0,
        hash_type: 0x83,
        annex: Some("507b979802e62d397acb29f56743a791894b99372872fc5af06a4f6e8d242d0615cda53062bb20e6ec79756fe39183f0c128adfe85559a8fa042b042c018aa8010143799e44f0893c40e1e"),
        tapscript: None,
        sighash: "3b003000add359a364a156e73e02846782a59d0d95ca8c4638aaad99f2ef915c",
    },
    TaprootSighashVector {
        tx: "020000000189fc651483f9296b906455dd939813bf086b1bbe7c77635e157c8e14ae29062195010000004445b5c7044561320000000000160014331414dbdada7fb578f700f38fb69995fc9b5ab958020000000000001976a914268db0a8104cc6d8afd91233cc8b3d1ace8ac3ef88ac580200000000000017a914ec00dcb368d6a693e11986d265f659d2f59e8be2875802000000000000160014c715799a49a0bae3956df9c17cb4440a673ac0df6f010000",
        spent: "011bec34000000000022512028055142ea437db73382e991861446040b61dd2185c4891d7daf6893d79f7182",
        input_index: 0,
        hash_type: 0x01,
        annex: None,
        tapscript: Some("20cc4e1107aea1d170c5ff5b6817e1303010049724fb3caa7941792ea9d29b3e2bacab"),
        sighash: "d66de5274a60400c7b08c86ba6b7f198f40660079edf53aca89d2a9501317f2e",
    },
];

/// The tapleaf hash of the tapscript in the last of [`TAPROOT_SIGHASHES`].
pub const TAPROOT_SIGHASH_LEAF_HASH: &str =
    "15a2530514e399f8b5cf0b3d3112cf5b289eaa3e308ba2071b58392fdc6da68a";

/// The outputs spent by the [`LEGACY_SIGNED`] transactions, for [`decode_tx_outs`]. Each is
/// 40000 satoshis paid to the key hash of `02f1c7ea…`.
pub const LEGACY_SIGNED_SPENT: &str = "03409c0000000000001976a9140de1f9b92d2ab6d8ead83f9a0ff5cf518dcb03b888ac409c0000000000001976a9140de1f9b92d2ab6d8ead83f9a0ff5cf518dcb03b888ac409c0000000000001976a9140de1f9b92d2ab6d8ead83f9a0ff5cf518dcb03b888ac";

/// One three-input transaction signed by a wallet with each legacy hash type. Every input spends
/// [`LEGACY_SIGNED_SPENT`] and is signed with the same key.
///
/// The last one drops the third output, so its third input signs the `SIGHASH_SINGLE` sentinel.
pub const LEGACY_SIGNED: [(u8, &str); 7] = [
    (
        0x01,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006a47304402206abb0622b8b6ca83f1f4de84830cf38bf4615dc9e47a7dcdcc489905f26aa9cb02201d2d8a7815242b88e4cd66390ca46da802238f9b1395e0d118213d30dad38184012102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006b483045022100de13b42804f87a09bb46def12ab4608108d8c2db41db4bc09064f9c46fcf493102205e5c759ab7b2895c9b0447e56029f6895ff7bb20e0847c564a88a3cfcf080c4f012102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006b4830450221009100a3f5b30182d1cb0172792af6947b6d8d42badb0539f2c209aece5a0628f002200ae91702ca63347e344c85fcb536f30ee97b75cdf4900de534ed5e040e71a548012102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x81,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006b483045022100bd2829550e9b3a081747281029b5f5a96bbd83bb6a92fa2f8310f1bd0d53abc90220071b469417c55cdb3b04171fd7900d2768981b7ab011553d84d24ea85d277079812102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006a47304402206295e17c45c6356ffb20365b696bcbb869db7e8697f4b8a684098ee2bff85feb02202905c441abe39ec9c480749236b84fdd3ebd91ecd25b559136370aacfcf2815c812102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006b483045022100f58e7c98ac8412944d575bcdece0e5966d4018f05988b5b60b6f46b8cb7a543102201c5854d3361e29b58123f34218cec2c722f5ec7a08235ebd007ec637b07c193a812102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x02,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006b483045022100e7f0a1ddd2c0b81e093e029b8a503afa27fe43549b0668d2141abf35eb3a63be022037f12d12cd50fc94a135f933406a8937557de9b9566a8841ff1548c1b6984531022102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006a473044022008451123ec2535dab545ade9d697519e63b28df5e311ea05e0ce28d39877a7c8022061ce5dbfb7ab478dd9e05b0acfd959ac3eb2641f61958f5d352f37621073d7c0022102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006a47304402205c001bcdfb35c70d8aa3bdbc75399afb72eb7cf1926ca7c1dfcddcb4d4d3e0f8022028992fffdcd4e9f34ab726f97c24157917641c2ef99361f588e3d4147d46eea5022102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x82,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006a47304402204ed272952177aaa5a1b171c2ca5a7a3d300ffcd7e04b040c0baaa4e3561862a502207e65a5b8f99c8a632b186c8a60496a12bf3116f51909b7497413aefdc3be7bf6822102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006a47304402203ec365300cc67602f4cc5be027959d3667b48db34c6c87d267c94a7e210d5c1f02204843350311c0a9711cad1960b17ce9e323a1ce6f37deefc3ffe63082d480be92822102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006b48304502210084f86f905c36372eff9c54ccd509a519a3325bcace8abfeed7ed3f0d579979e902201ff330dd2402e5ca9989a8a294fa36d6cf3a093edb18d29c9d9644186a3efeb4822102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x03,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006b483045022100e822f152bb15a1d623b91913cd0fb915e9f85a8dc6c26d51948208bbc0218e800220255f78549d9614c88eac9551429bc00224f22cdcb41a3af70d52138f7e98d333032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006a47304402206f37f79adeb86e0e2da679f79ff5c3ba206c6d35cd9a21433f0de34ee83ddbc00220118cabbac5d83b3aa4c2dc01b061e4b2fe83750d85a72ae6a1752300ee5d9aff032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006a473044022042ac843d220a56b3de05f24c85a63e71efa7e5fc7c2ec766a2ffae82a88572b0022051a816b317313ea8d90010a77c3e02d41da4a500e67e6a5347674f836f528d82032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x83,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006b483045022100d05a3b6cf2f0301000b0e45c09054f2c61570ce8798ebf571eef72da3b1c94a1022016d7ef3c133fa703bae2c75158ea08d335ac698506f99b3c369c37a9e8fc4beb832102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006b483045022100ee6bf07b051001dcbfa062692a40adddd070303286b714825b3fb4693dd8fcdb022056610885e5053e5d47f2be3433051305abe7978ead8f7cf2d0368947aff6b307832102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006b483045022100cfc930d5b5272d0220d9da98fabec97b9e66306f735efa837f43f6adc675cad902202f9dff76b8b9ec8f613d46094f17f64d875804292d8804aa59fd295b6fc1416b832102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff03204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac50c30000000000001976a91404ccb4eed8cfa9f6e394e945178960f5ccddb38788ac00000000",
    ),
    (
        0x03,
        "01000000037db7f0b2a345ded6ddf28da3211a7d7a95a2943e9a879493d6481b7d69613f04010000006b483045022100e822f152bb15a1d623b91913cd0fb915e9f85a8dc6c26d51948208bbc0218e800220255f78549d9614c88eac9551429bc00224f22cdcb41a3af70d52138f7e98d333032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff652c491e5a781a6a3c547fa8d980741acbe4623ae52907278f10e1f064f67e05000000006a47304402206f37f79adeb86e0e2da679f79ff5c3ba206c6d35cd9a21433f0de34ee83ddbc00220118cabbac5d83b3aa4c2dc01b061e4b2fe83750d85a72ae6a1752300ee5d9aff032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffffb9fa270fa3e4dd8c79f9cbfe5f1953cba071ed081f7c277a49c33466c695db35000000006a473044022019a2a3322dcdb0e0c25df9f03f264f2c88f43b3b648fec7a28cb85620393a9750220135ff3a6668c6d6c05f32069e47a1feda10979935af2470c97fcb388f96f9738032102f1c7eac9200f8dee7e34e59318ff2076c8b3e3ac7f43121e57569a1aec1803d4ffffffff02204e0000000000001976a9149ed1f577c60e4be1dbf35318ec12f51d25e8577388ac30750000000000001976a914fb407e88c48921d5547d899e18a7c0a36919f54d88ac00000000",
    ),
];

/// Render a failing vector for an assertion message.
pub fn describe(tv: &TestVector, actual: &Result<bool, script::Error>) -> String {
    format!(
        "{}: expected {:?}, got {:?}",
        tv.comment, tv.result, actual
    )
}

#[cfg(test)]
mod tests {
    use super::{decode_tx, describe, test_vectors, BIP143_NATIVE_P2WPKH_TX};

    #[test]
    fn script_vectors() {
        for tv in test_vectors() {
            if let Err(actual) = tv.run() {
                panic!("{}", describe(&tv, &actual));
            }
        }
    }

    #[test]
    fn decodes_fixture_transactions() {
        let tx = decode_tx(BIP143_NATIVE_P2WPKH_TX);
        assert_eq!(tx.version, 1);
        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.inputs[0].sequence, 0xffff_ffee);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 112_340_000);
        assert_eq!(tx.lock_time, 17);
    }
}
