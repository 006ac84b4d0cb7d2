//! 增量解码
//!
//! 逐个 token 解码时, 多字节字符可能被拆到多个 token 中,
//! 解码结果以 U+FFFD 结尾时暂不输出

use tokenizers::Tokenizer;

use crate::error::Error;

pub trait Detokenize {
    fn detokenize(&self, ids: &[u32]) -> Result<String, Error>;
}

impl Detokenize for Tokenizer {
    fn detokenize(&self, ids: &[u32]) -> Result<String, Error> {
        self.decode(ids, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }
}

pub struct TokenDecoder<'a, T: Detokenize + ?Sized> {
    tokenizer: &'a T,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl<'a, T: Detokenize + ?Sized> TokenDecoder<'a, T> {
    pub fn new(tokenizer: &'a T) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    /// 追加一个 token, 返回可以输出的新文本
    pub fn push(&mut self, token: u32) -> Result<Option<String>, Error> {
        let prev_text = self
            .tokenizer
            .detokenize(&self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = self.tokenizer.detokenize(&self.tokens[self.prev_index..])?;

        if text.len() <= prev_text.len() || text.ends_with('\u{FFFD}') {
            return Ok(None);
        }
        let Some(piece) = text.get(prev_text.len()..) else {
            return Ok(None);
        };
        let piece = piece.to_string();
        self.prev_index = self.current_index;
        self.current_index = self.tokens.len();
        Ok(Some(piece))
    }

    /// 生成结束, 输出剩余文本
    pub fn finish(&mut self) -> Result<Option<String>, Error> {
        let prev_text = self
            .tokenizer
            .detokenize(&self.tokens[self.prev_index..self.current_index])?;
        let text = self.tokenizer.detokenize(&self.tokens[self.prev_index..])?;
        self.prev_index = self.tokens.len();
        self.current_index = self.tokens.len();

        Ok(text
            .get(prev_text.len()..)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string))
    }
}
