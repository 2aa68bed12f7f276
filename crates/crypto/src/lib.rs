#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Cipher collaborators and the streaming decrypt sink
//!
//! Bundles are decrypted while they download. The transport pushes raw
//! response chunks into a [`StreamingDecryptSink`], which buffers until the
//! cipher header is available, then decrypts fixed-size windows straight to
//! the destination file. Algorithms plug in through [`CryptoStreamFactory`].

pub mod aes_cbc;
pub mod cipher;
pub mod encrypt;
pub mod sink;

pub use aes_cbc::Aes128CbcFactory;
pub use cipher::{CryptoStreamFactory, PassthroughFactory, StreamDecryptor, StreamEncryptor};
pub use encrypt::{encrypt_bytes, encrypt_file};
pub use sink::{decrypt_file, DecryptCursor, SinkSettings, StreamingDecryptSink};
