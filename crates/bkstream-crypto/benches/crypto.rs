use std::io::{Read, Write};

use bkstream_crypto::{CbcDecryptReader, CbcEncryptWriter, KeyMaterial, MacWriter};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn material() -> KeyMaterial {
    KeyMaterial::derive(&[0xABu8; 32], Some(&[0x01u8; 16])).unwrap()
}

#[divan::bench]
fn derive_key_material() -> KeyMaterial {
    KeyMaterial::derive(divan::black_box(&[0xABu8; 32]), Some(&[0x01u8; 16])).unwrap()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_and_mac(bencher: divan::Bencher, size: usize) {
    let keys = material();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mac = MacWriter::new(Vec::with_capacity(size + 64), keys.mac_key()).unwrap();
            let mut enc = CbcEncryptWriter::new(mac, keys.cipher_key(), keys.iv());
            enc.write_all(divan::black_box(&data)).unwrap();
            enc.finish().unwrap().finalize()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let keys = material();
    let data = make_data(size);
    let mut enc = CbcEncryptWriter::new(Vec::new(), keys.cipher_key(), keys.iv());
    enc.write_all(&data).unwrap();
    let ciphertext = enc.finish().unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            CbcDecryptReader::new(
                divan::black_box(ciphertext.as_slice()),
                keys.cipher_key(),
                keys.iv(),
                ciphertext.len() as u64,
            )
            .read_to_end(&mut out)
            .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
