//! Authentication payloads
//!
//! ## MYSQL41
//! ```text
//! schema \0 user \0 * HEX( SHA1(password) XOR SHA1(salt + SHA1(SHA1(password))) )
//! ```
//!
//! ## SHA256_MEMORY
//! ```text
//! schema \0 user \0 HEX( SHA256(password) XOR SHA256(SHA256(SHA256(password)) + salt) )
//! ```
//!
//! ## PLAIN
//! ```text
//! schema \0 user \0 password
//! ```
//! Only safe over an encrypted channel.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Strip the trailing NUL some servers append to the salt
fn salt(auth_data: &[u8]) -> &[u8] {
    match auth_data.split_last() {
        Some((&0, rest)) if rest.len() == 20 => rest,
        _ => auth_data,
    }
}

fn xor(left: &[u8], right: &[u8]) -> Vec<u8> {
    left.iter().zip(right.iter()).map(|(a, b)| a ^ b).collect()
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// `SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))`
pub fn mysql41_scramble(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(salt(auth_data));
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + salt)`
pub fn sha256_scramble(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(salt(auth_data));
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

fn prefix(schema: &str, user: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(schema.len() + user.len() + 2 + 41);
    data.extend_from_slice(schema.as_bytes());
    data.push(0);
    data.extend_from_slice(user.as_bytes());
    data.push(0);
    data
}

/// Continuation payload for `MYSQL41`
pub fn mysql41_response(schema: &str, user: &str, password: &str, auth_data: &[u8]) -> Vec<u8> {
    let mut data = prefix(schema, user);
    let scramble = mysql41_scramble(password, auth_data);
    if !scramble.is_empty() {
        data.push(b'*');
        data.extend_from_slice(hex_upper(&scramble).as_bytes());
    }
    data
}

/// Continuation payload for `SHA256_MEMORY`
pub fn sha256_memory_response(
    schema: &str,
    user: &str,
    password: &str,
    auth_data: &[u8],
) -> Vec<u8> {
    let mut data = prefix(schema, user);
    data.extend_from_slice(hex_upper(&sha256_scramble(password, auth_data)).as_bytes());
    data
}

/// Initial payload for `PLAIN`
pub fn plain_payload(schema: &str, user: &str, password: &str) -> Vec<u8> {
    let mut data = prefix(schema, user);
    data.extend_from_slice(password.as_bytes());
    data
}
