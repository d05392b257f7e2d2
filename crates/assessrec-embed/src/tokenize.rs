use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// Model inputs for one sequence (or sequence pair), each shaped `[1, T]`.
pub struct EncodedInput {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Tokenize a single text or a `(query, passage)` pair, truncating to
/// `max_len` tokens. No padding: every call is a batch of one.
pub fn tokenize_on_device<'s, E>(tokenizer: &Tokenizer, input: E, max_len: usize, device: &Device) -> Result<EncodedInput>
where
    E: Into<EncodeInput<'s>>,
{
    let enc = tokenizer.encode(input, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    let mut type_ids = enc.get_type_ids().to_vec();
    if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); type_ids.truncate(max_len); }
    if ids.is_empty() { return Err(anyhow!("Tokenization produced no tokens")); }
    let len = ids.len();
    let input_ids = Tensor::from_iter(ids, device)?.reshape((1, len))?;
    let attention_mask = Tensor::from_iter(mask, device)?.reshape((1, len))?;
    let token_type_ids = Tensor::from_iter(type_ids, device)?.reshape((1, len))?;
    Ok(EncodedInput { input_ids, attention_mask, token_type_ids })
}
