//! Textual CPON codec over the [`shv_value`] data model — a JSON-like
//! debugging-friendly counterpart to `shv_chainpack`'s binary form.
//!
//! Pure like its binary sibling: never logs, never panics, returns a typed
//! [`error::DecodeError`]/[`error::EncodeError`] on malformed input.

mod datetime;
mod error;
mod hexfloat;
mod reader;
mod writer;

pub use error::{DecodeError, EncodeError};
pub use reader::{CponReader, MAX_NESTING_DEPTH, decode};
pub use writer::{CponWriter, encode};

#[cfg(test)]
mod cross_agreement {
    //! Property 2 (§8): `cpon⁻¹(cpon(cp⁻¹(b))) ≡ cp⁻¹(b)` for well-formed
    //! ChainPack buffers — exercised here since it needs both codecs.
    use shv_value::{Data, Value};

    fn cross_check(v: Value) {
        let cp_bytes = shv_chainpack::encode(&v).unwrap();
        let via_cp = shv_chainpack::decode(&cp_bytes).unwrap();
        let cpon_text = crate::encode(&via_cp).unwrap();
        let via_cpon = crate::decode(&cpon_text).unwrap();
        assert_eq!(via_cpon, via_cp);
    }

    #[test]
    fn agrees_across_codecs() {
        cross_check(Value::from(42i64));
        cross_check(Value::from("hello"));
        cross_check(Value::new(Data::List(vec![
            Value::from(1i64),
            Value::null(),
            Value::from(1.5f64),
        ])));
        let mut v = Value::from(true);
        v.meta_mut().set_int(8, Value::from(123i64));
        cross_check(v);
    }
}
