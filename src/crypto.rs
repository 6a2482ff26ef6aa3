use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, InvalidLength, KeyIvInit};
use cbc::Decryptor;

const BLOCK_SIZE: usize = 16;

/// AES-CBC 解密，密钥长度决定 AES-128/192/256
///
/// 优先按 PKCS#7 去除填充；去填充失败且数据按块对齐时，原样返回解密后的全部块。
pub fn decrypt_data(encrypted_data: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, String> {
    match key.len() {
        16 => decrypt_with(encrypted_data, || Decryptor::<aes::Aes128>::new_from_slices(key, iv)),
        24 => decrypt_with(encrypted_data, || Decryptor::<aes::Aes192>::new_from_slices(key, iv)),
        32 => decrypt_with(encrypted_data, || Decryptor::<aes::Aes256>::new_from_slices(key, iv)),
        n => Err(format!("unsupported key length: {} bytes", n)),
    }
}

fn decrypt_with<D, F>(encrypted_data: &[u8], new_cipher: F) -> Result<Vec<u8>, String>
where
    D: BlockDecryptMut,
    F: Fn() -> Result<D, InvalidLength>,
{
    let cipher = new_cipher().map_err(|e| format!("invalid key or IV length: {}", e))?;
    let mut buf = encrypted_data.to_vec();
    let unpadded = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map(|plain| plain.len());

    match unpadded {
        Ok(len) => {
            buf.truncate(len);
            Ok(buf)
        }
        Err(_) if !encrypted_data.is_empty() && encrypted_data.len() % BLOCK_SIZE == 0 => {
            // 部分流的分段没有 PKCS#7 填充
            buf.copy_from_slice(encrypted_data);
            let cipher = new_cipher().map_err(|e| format!("invalid key or IV length: {}", e))?;
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|e| format!("Decryption error: {}", e))?;
            Ok(buf)
        }
        Err(e) => Err(format!("Decryption error: {}", e)),
    }
}
