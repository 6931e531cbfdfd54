//! Standard security handler: key derivation for revisions 3, 4 and 6 and
//! per-object string/stream encryption.

use std::cell::RefCell;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};
use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{AssemblyError, Result};
use crate::object::{Dict, Object, ObjectCipher};
use crate::template::SecurityConfig;

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    /// V2 R3, 128-bit RC4.
    Rc4_128,
    /// V4 R4, AESV2 crypt filter.
    Aes128,
    /// V5 R6, AESV3 crypt filter.
    #[default]
    Aes256,
}

impl EncryptionAlgorithm {
    fn revision(self) -> u8 {
        match self {
            EncryptionAlgorithm::Rc4_128 => 3,
            EncryptionAlgorithm::Aes128 => 4,
            EncryptionAlgorithm::Aes256 => 6,
        }
    }
}

/// User access permissions stored in `/P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub print: bool,
    pub modify: bool,
    pub copy: bool,
    pub annotate: bool,
    pub fill_forms: bool,
    pub accessibility: bool,
    pub assemble: bool,
    pub print_high_quality: bool,
}

impl Permissions {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            print: config.allow_printing,
            modify: config.allow_modifying,
            copy: config.allow_copying,
            annotate: config.allow_annotations,
            fill_forms: config.allow_form_filling,
            accessibility: config.allow_accessibility,
            assemble: config.allow_assembly,
            print_high_quality: config.allow_high_quality_print,
        }
    }

    /// Signed `/P` value; reserved bits are set as the standard requires.
    pub fn p_value(&self) -> i32 {
        let mut bits: u32 = 0xFFFF_F0C0;
        for (allowed, bit) in [
            (self.print, 1 << 2),
            (self.modify, 1 << 3),
            (self.copy, 1 << 4),
            (self.annotate, 1 << 5),
            (self.fill_forms, 1 << 8),
            (self.accessibility, 1 << 9),
            (self.assemble, 1 << 10),
            (self.print_high_quality, 1 << 11),
        ] {
            if allowed {
                bits |= bit;
            }
        }
        bits as i32
    }
}

struct Rc4Cipher {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4Cipher {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, val) in s.iter_mut().enumerate() {
            *val = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[k as usize]
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }
}

/// RC4 is symmetric; the same call encrypts and decrypts.
fn rc4_crypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    let mut cipher = Rc4Cipher::new(key);
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = 16 - data.len() % 16;
    let mut out = data.to_vec();
    out.extend(std::iter::repeat_n(pad as u8, pad));
    out
}

fn pkcs7_unpad(data: &[u8]) -> Option<Vec<u8>> {
    let pad = *data.last()? as usize;
    if pad == 0 || pad > 16 || pad > data.len() {
        return None;
    }
    let (body, tail) = data.split_at(data.len() - pad);
    tail.iter().all(|b| *b as usize == pad).then(|| body.to_vec())
}

/// CBC over whole blocks; `data.len()` must be a multiple of 16.
fn aes128_cbc_blocks(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut enc = cbc::Encryptor::<Aes128>::new(&GenericArray::from(*key), &GenericArray::from(*iv));
    for block in data.chunks_exact_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn aes256_cbc_blocks(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) {
    let mut enc = cbc::Encryptor::<Aes256>::new(&GenericArray::from(*key), &GenericArray::from(*iv));
    for block in data.chunks_exact_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn aes256_cbc_decrypt_blocks(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) {
    let mut dec = cbc::Decryptor::<Aes256>::new(&GenericArray::from(*key), &GenericArray::from(*iv));
    for block in data.chunks_exact_mut(16) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn aes128_cbc_decrypt_blocks(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut dec = cbc::Decryptor::<Aes128>::new(&GenericArray::from(*key), &GenericArray::from(*iv));
    for block in data.chunks_exact_mut(16) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = bytes.len().min(N);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = PASSWORD_PADDING;
    let len = password.len().min(32);
    out[..len].copy_from_slice(&password[..len]);
    out
}

fn md5_rounds(mut digest: [u8; 16], rounds: usize) -> [u8; 16] {
    for _ in 0..rounds {
        digest = Md5::digest(digest).into();
    }
    digest
}

/// Algorithm 3: the `/O` entry for revisions 3 and 4.
fn owner_value_r4(owner: &[u8], user: &[u8]) -> [u8; 32] {
    let key = md5_rounds(Md5::digest(pad_password(owner)).into(), 50);
    let mut value = rc4_crypt(&key, &pad_password(user));
    for round in 1..=19u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
        value = rc4_crypt(&round_key, &value);
    }
    to_array(&value)
}

/// Algorithm 2: file key from a (padded) user password.
fn file_key_r4(user: &[u8], owner_value: &[u8; 32], p: i32, file_id: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(pad_password(user));
    hasher.update(owner_value);
    hasher.update(p.to_le_bytes());
    hasher.update(file_id);
    md5_rounds(hasher.finalize().into(), 50)
}

/// Algorithm 5: the `/U` entry for revisions 3 and 4.
fn user_value_r4(key: &[u8; 16], file_id: &[u8]) -> [u8; 32] {
    let mut hasher = Md5::new();
    hasher.update(PASSWORD_PADDING);
    hasher.update(file_id);
    let mut value = rc4_crypt(key, &hasher.finalize());
    for round in 1..=19u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
        value = rc4_crypt(&round_key, &value);
    }
    to_array(&value)
}

/// Algorithm 2.B: iterated SHA-2/AES hash used by revision 6.
fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(udata);
    let mut k: Vec<u8> = hasher.finalize().to_vec();

    let mut round: u32 = 0;
    loop {
        let mut k1 = Vec::with_capacity(64 * (password.len() + k.len() + udata.len()));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(udata);
        }
        let aes_key: [u8; 16] = to_array(&k[..16]);
        let iv: [u8; 16] = to_array(&k[16..32]);
        aes128_cbc_blocks(&aes_key, &iv, &mut k1);
        let e = k1;

        let selector: u32 = e[..16].iter().map(|b| *b as u32).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = e.last().copied().unwrap_or(0) as u32;
        if round >= 64 && last + 32 <= round {
            break;
        }
    }
    to_array(&k[..32])
}

fn truncate_r6(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(127)]
}

#[derive(Clone)]
enum FileKey {
    Rc4([u8; 16]),
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

/// Per-document cipher handed to the object writer.
pub struct StandardSecurityHandler {
    key: FileKey,
    rng: RefCell<StdRng>,
}

impl StandardSecurityHandler {
    /// Algorithm 1: object key for revisions 3 and 4.
    fn object_key(key: &[u8; 16], obj_num: u32, gen_num: u16, aes: bool) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(key);
        hasher.update(&obj_num.to_le_bytes()[..3]);
        hasher.update(gen_num.to_le_bytes());
        if aes {
            hasher.update(b"sAlT");
        }
        // min(n + 5, 16) is the full digest for a 16-byte file key
        hasher.finalize().into()
    }

    fn encrypt(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Vec<u8> {
        match &self.key {
            FileKey::Rc4(key) => rc4_crypt(&Self::object_key(key, obj_num, gen_num, false), data),
            FileKey::Aes128(key) => {
                let object_key = Self::object_key(key, obj_num, gen_num, true);
                let iv = self.next_iv();
                let mut body = pkcs7_pad(data);
                aes128_cbc_blocks(&object_key, &iv, &mut body);
                let mut out = iv.to_vec();
                out.extend_from_slice(&body);
                out
            }
            FileKey::Aes256(key) => {
                let iv = self.next_iv();
                let mut body = pkcs7_pad(data);
                aes256_cbc_blocks(key, &iv, &mut body);
                let mut out = iv.to_vec();
                out.extend_from_slice(&body);
                out
            }
        }
    }

    /// Reverses `encrypt`; `None` when the ciphertext is malformed.
    pub fn decrypt(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Option<Vec<u8>> {
        match &self.key {
            FileKey::Rc4(key) => Some(rc4_crypt(&Self::object_key(key, obj_num, gen_num, false), data)),
            FileKey::Aes128(key) => {
                let object_key = Self::object_key(key, obj_num, gen_num, true);
                let (iv, body) = split_iv(data)?;
                let mut body = body.to_vec();
                aes128_cbc_decrypt_blocks(&object_key, &iv, &mut body);
                pkcs7_unpad(&body)
            }
            FileKey::Aes256(key) => {
                let (iv, body) = split_iv(data)?;
                let mut body = body.to_vec();
                aes256_cbc_decrypt_blocks(key, &iv, &mut body);
                pkcs7_unpad(&body)
            }
        }
    }

    fn next_iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        self.rng.borrow_mut().fill_bytes(&mut iv);
        iv
    }
}

fn split_iv(data: &[u8]) -> Option<([u8; 16], &[u8])> {
    if data.len() < 32 || data.len() % 16 != 0 {
        return None;
    }
    Some((to_array(&data[..16]), &data[16..]))
}

impl ObjectCipher for StandardSecurityHandler {
    fn encrypt_string(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Vec<u8> {
        self.encrypt(data, obj_num, gen_num)
    }

    fn encrypt_stream(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Vec<u8> {
        self.encrypt(data, obj_num, gen_num)
    }
}

/// Encrypt dictionary plus the handler that encrypts every other object.
pub struct EncryptionSetup {
    pub dict: Dict,
    pub handler: StandardSecurityHandler,
}

/// Derives keys and the Encrypt dictionary. `seed` drives every random byte
/// (file key, salts, IVs) so identical inputs give identical output.
pub fn prepare(
    config: &SecurityConfig,
    algorithm: EncryptionAlgorithm,
    file_id: &[u8; 16],
    seed: u64,
) -> Result<EncryptionSetup> {
    let user = config.user_password.as_str();
    let owner = if config.owner_password.is_empty() {
        user
    } else {
        config.owner_password.as_str()
    };
    if algorithm != EncryptionAlgorithm::Aes256 && (user.len() > 32 || owner.len() > 32) {
        log::warn!("passwords longer than 32 bytes are truncated for revision {}", algorithm.revision());
    }
    let p = Permissions::from_config(config).p_value();
    let mut rng = StdRng::seed_from_u64(seed);

    let (dict, key) = match algorithm {
        EncryptionAlgorithm::Rc4_128 | EncryptionAlgorithm::Aes128 => {
            let o = owner_value_r4(owner.as_bytes(), user.as_bytes());
            let key = file_key_r4(user.as_bytes(), &o, p, file_id);
            let mut u = user_value_r4(&key, file_id).to_vec();
            u.truncate(16);
            u.extend_from_slice(&[0u8; 16]);
            let mut dict = Dict::new().with("Filter", Object::name("Standard"));
            if algorithm == EncryptionAlgorithm::Rc4_128 {
                dict = dict
                    .with("V", 2i64)
                    .with("R", 3i64)
                    .with("Length", 128i64);
            } else {
                dict = dict
                    .with("V", 4i64)
                    .with("R", 4i64)
                    .with("Length", 128i64)
                    .with("CF", crypt_filters("AESV2", 16))
                    .with("StmF", Object::name("StdCF"))
                    .with("StrF", Object::name("StdCF"));
            }
            let dict = dict
                .with("O", Object::HexStr(o.to_vec()))
                .with("U", Object::HexStr(u))
                .with("P", p as i64)
                .with("EncryptMetadata", true);
            let key = if algorithm == EncryptionAlgorithm::Rc4_128 {
                FileKey::Rc4(key)
            } else {
                FileKey::Aes128(key)
            };
            (dict, key)
        }
        EncryptionAlgorithm::Aes256 => {
            let user = truncate_r6(user);
            let owner = truncate_r6(owner);
            let mut file_key = [0u8; 32];
            rng.fill_bytes(&mut file_key);
            let mut salts = [0u8; 32];
            rng.fill_bytes(&mut salts);
            let (user_val_salt, rest) = salts.split_at(8);
            let (user_key_salt, rest) = rest.split_at(8);
            let (owner_val_salt, owner_key_salt) = rest.split_at(8);

            let mut u = hash_r6(user, user_val_salt, &[]).to_vec();
            u.extend_from_slice(user_val_salt);
            u.extend_from_slice(user_key_salt);
            let mut ue = file_key.to_vec();
            aes256_cbc_blocks(&hash_r6(user, user_key_salt, &[]), &[0; 16], &mut ue);

            let mut o = hash_r6(owner, owner_val_salt, &u).to_vec();
            o.extend_from_slice(owner_val_salt);
            o.extend_from_slice(owner_key_salt);
            let mut oe = file_key.to_vec();
            aes256_cbc_blocks(&hash_r6(owner, owner_key_salt, &u), &[0; 16], &mut oe);

            let mut perms = [0u8; 16];
            perms[..4].copy_from_slice(&p.to_le_bytes());
            perms[4..8].copy_from_slice(&[0xFF; 4]);
            perms[8..12].copy_from_slice(b"Tadb");
            rng.fill_bytes(&mut perms[12..16]);
            let mut block = GenericArray::from(perms);
            Aes256::new(&GenericArray::from(file_key)).encrypt_block(&mut block);

            let dict = Dict::new()
                .with("Filter", Object::name("Standard"))
                .with("V", 5i64)
                .with("R", 6i64)
                .with("Length", 256i64)
                .with("CF", crypt_filters("AESV3", 32))
                .with("StmF", Object::name("StdCF"))
                .with("StrF", Object::name("StdCF"))
                .with("O", Object::HexStr(o))
                .with("U", Object::HexStr(u))
                .with("OE", Object::HexStr(oe))
                .with("UE", Object::HexStr(ue))
                .with("P", p as i64)
                .with("Perms", Object::HexStr(block.to_vec()))
                .with("EncryptMetadata", true);
            (dict, FileKey::Aes256(file_key))
        }
    };

    log::debug!("prepared revision {} encryption, P={p}", algorithm.revision());
    Ok(EncryptionSetup {
        dict,
        handler: StandardSecurityHandler {
            key,
            rng: RefCell::new(rng),
        },
    })
}

fn crypt_filters(method: &str, length: i64) -> Dict {
    Dict::new().with(
        "StdCF",
        Dict::typed("CryptFilter")
            .with("CFM", Object::name(method))
            .with("AuthEvent", Object::name("DocOpen"))
            .with("Length", length),
    )
}

fn bytes_entry(dict: &Dict, key: &str) -> Result<Vec<u8>> {
    match dict.get(key) {
        Some(Object::HexStr(bytes)) | Some(Object::Str(bytes)) => Ok(bytes.clone()),
        _ => Err(AssemblyError::SecurityConfig(format!("encrypt dictionary lacks /{key}"))),
    }
}

fn int_entry(dict: &Dict, key: &str) -> Result<i64> {
    match dict.get(key) {
        Some(Object::Int(value)) => Ok(*value),
        _ => Err(AssemblyError::SecurityConfig(format!("encrypt dictionary lacks /{key}"))),
    }
}

/// Recovers a decrypting handler from an Encrypt dictionary using either the
/// user or the owner password.
pub fn authenticate(dict: &Dict, file_id: &[u8], password: &str) -> Result<StandardSecurityHandler> {
    let revision = int_entry(dict, "R")?;
    let o = bytes_entry(dict, "O")?;
    let u = bytes_entry(dict, "U")?;
    let handler = |key| StandardSecurityHandler {
        key,
        rng: RefCell::new(StdRng::seed_from_u64(0)),
    };
    let wrong = || AssemblyError::SecurityConfig("incorrect password".to_string());

    match revision {
        3 | 4 => {
            let p = int_entry(dict, "P")? as i32;
            let o: [u8; 32] = to_array(&o);
            let wrap = |key: [u8; 16]| {
                if revision == 3 {
                    FileKey::Rc4(key)
                } else {
                    FileKey::Aes128(key)
                }
            };
            let check_user = |padded_user: &[u8]| -> Option<[u8; 16]> {
                let key = file_key_r4(padded_user, &o, p, file_id);
                let expected = user_value_r4(&key, file_id);
                (u.len() >= 16 && expected[..16] == u[..16]).then_some(key)
            };
            if let Some(key) = check_user(password.as_bytes()) {
                return Ok(handler(wrap(key)));
            }
            // owner path: unwrap /O to the padded user password
            let owner_key = md5_rounds(Md5::digest(pad_password(password.as_bytes())).into(), 50);
            let mut user_padded = o.to_vec();
            for round in (0..=19u8).rev() {
                let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ round).collect();
                user_padded = rc4_crypt(&round_key, &user_padded);
            }
            check_user(&user_padded)
                .map(|key| handler(wrap(key)))
                .ok_or_else(wrong)
        }
        6 => {
            let password = truncate_r6(password);
            if u.len() < 48 || o.len() < 48 {
                return Err(AssemblyError::SecurityConfig("short /U or /O entry".to_string()));
            }
            let (salt_for_key, udata, wrapped) = if hash_r6(password, &u[32..40], &[]) == u[..32] {
                (&u[40..48], &[][..], bytes_entry(dict, "UE")?)
            } else if hash_r6(password, &o[32..40], &u[..48]) == o[..32] {
                (&o[40..48], &u[..48], bytes_entry(dict, "OE")?)
            } else {
                return Err(wrong());
            };
            let intermediate = hash_r6(password, salt_for_key, udata);
            let mut key = wrapped;
            if key.len() != 32 {
                return Err(AssemblyError::SecurityConfig("malformed wrapped key".to_string()));
            }
            aes256_cbc_decrypt_blocks(&intermediate, &[0; 16], &mut key);
            let key: [u8; 32] = to_array(&key);

            let perms = bytes_entry(dict, "Perms")?;
            if perms.len() == 16 {
                let mut block = GenericArray::from(to_array::<16>(&perms));
                Aes256::new(&GenericArray::from(key)).decrypt_block(&mut block);
                if &block[9..12] != b"adb" {
                    return Err(AssemblyError::SecurityConfig("permissions check failed".to_string()));
                }
            }
            Ok(handler(FileKey::Aes256(key)))
        }
        other => Err(AssemblyError::SecurityConfig(format!(
            "unsupported security handler revision {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(user: &str, owner: &str) -> SecurityConfig {
        SecurityConfig {
            enabled: true,
            user_password: user.to_string(),
            owner_password: owner.to_string(),
            allow_printing: true,
            ..SecurityConfig::default()
        }
    }

    const FILE_ID: [u8; 16] = [0x42; 16];

    #[test]
    fn rc4_is_symmetric() {
        let key = b"Key";
        let encrypted = rc4_crypt(key, b"Plaintext");
        assert_eq!(encrypted, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
        assert_eq!(rc4_crypt(key, &encrypted), b"Plaintext");
    }

    #[test]
    fn permission_bits_are_independent() {
        let none = Permissions::default().p_value();
        assert_eq!(none as u32, 0xFFFF_F0C0);
        let copy = Permissions {
            copy: true,
            ..Permissions::default()
        };
        assert_eq!(copy.p_value() as u32 ^ none as u32, 16);
        let all = Permissions {
            print: true,
            modify: true,
            copy: true,
            annotate: true,
            fill_forms: true,
            accessibility: true,
            assemble: true,
            print_high_quality: true,
        };
        assert_eq!(all.p_value(), -4);
    }

    #[test]
    fn every_algorithm_round_trips_with_either_password() {
        for algorithm in [
            EncryptionAlgorithm::Rc4_128,
            EncryptionAlgorithm::Aes128,
            EncryptionAlgorithm::Aes256,
        ] {
            let setup = prepare(&config("user", "owner"), algorithm, &FILE_ID, 7).unwrap();
            let encrypted = setup.handler.encrypt_stream(b"BT (Hello) Tj ET", 5, 0);
            assert_ne!(&encrypted[..], b"BT (Hello) Tj ET");
            for password in ["user", "owner"] {
                let opened = authenticate(&setup.dict, &FILE_ID, password).unwrap();
                assert_eq!(
                    opened.decrypt(&encrypted, 5, 0).unwrap(),
                    b"BT (Hello) Tj ET",
                    "{algorithm:?} with {password}"
                );
            }
            assert!(authenticate(&setup.dict, &FILE_ID, "nope").is_err(), "{algorithm:?}");
        }
    }

    #[test]
    fn empty_user_password_opens_without_prompt() {
        let setup = prepare(&config("", "secret"), EncryptionAlgorithm::Aes128, &FILE_ID, 1).unwrap();
        assert!(authenticate(&setup.dict, &FILE_ID, "").is_ok());
        assert!(authenticate(&setup.dict, &FILE_ID, "secret").is_ok());
    }

    #[test]
    fn seeded_setups_are_reproducible() {
        let a = prepare(&config("u", "o"), EncryptionAlgorithm::Aes256, &FILE_ID, 99).unwrap();
        let b = prepare(&config("u", "o"), EncryptionAlgorithm::Aes256, &FILE_ID, 99).unwrap();
        assert_eq!(a.dict, b.dict);
        assert_eq!(a.handler.encrypt_string(b"x", 1, 0), b.handler.encrypt_string(b"x", 1, 0));
    }

    #[test]
    fn revision_six_dictionary_shape() {
        let setup = prepare(&config("u", ""), EncryptionAlgorithm::Aes256, &FILE_ID, 3).unwrap();
        assert_eq!(setup.dict.get("V"), Some(&Object::Int(5)));
        assert_eq!(setup.dict.get("R"), Some(&Object::Int(6)));
        for key in ["O", "U"] {
            let Some(Object::HexStr(bytes)) = setup.dict.get(key) else {
                panic!("missing {key}");
            };
            assert_eq!(bytes.len(), 48);
        }
        let Some(Object::HexStr(perms)) = setup.dict.get("Perms") else {
            panic!("missing Perms");
        };
        assert_eq!(perms.len(), 16);
    }

    #[test]
    fn object_keys_differ_per_object() {
        let key = [1u8; 16];
        assert_ne!(
            StandardSecurityHandler::object_key(&key, 1, 0, false),
            StandardSecurityHandler::object_key(&key, 2, 0, false)
        );
        assert_ne!(
            StandardSecurityHandler::object_key(&key, 1, 0, false),
            StandardSecurityHandler::object_key(&key, 1, 0, true)
        );
    }
}
