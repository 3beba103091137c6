//! Calldata encoding for the contracts the engine touches: the USDC ERC-20,
//! the escrow contract, the merchant gateway, and the ERC-2771 forwarder.

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

// ERC-20

pub fn erc20_transfer(to: Address, amount: U256) -> Vec<u8> {
    call("transfer(address,uint256)", &[Token::Address(to), Token::Uint(amount)])
}

pub fn erc20_approve(spender: Address, amount: U256) -> Vec<u8> {
    call("approve(address,uint256)", &[Token::Address(spender), Token::Uint(amount)])
}

pub fn erc20_decimals() -> Vec<u8> {
    selector("decimals()").to_vec()
}

pub fn erc20_balance_of(owner: Address) -> Vec<u8> {
    call("balanceOf(address)", &[Token::Address(owner)])
}

pub fn erc20_allowance(owner: Address, spender: Address) -> Vec<u8> {
    call("allowance(address,address)", &[Token::Address(owner), Token::Address(spender)])
}

// Escrow

pub fn escrow_deposit(amount: U256) -> Vec<u8> {
    call("deposit(uint256)", &[Token::Uint(amount)])
}

pub fn escrow_pre_authorize(spender: Address, max_amount: U256) -> Vec<u8> {
    call(
        "preAuthorize(address,uint256)",
        &[Token::Address(spender), Token::Uint(max_amount)],
    )
}

pub fn escrow_charge(from: Address, amount: U256, memo: &str) -> Vec<u8> {
    call(
        "charge(address,uint256,string)",
        &[
            Token::Address(from),
            Token::Uint(amount),
            Token::String(memo.to_string()),
        ],
    )
}

// Merchant gateway

pub fn gateway_buy(product_id: U256, memo: &str) -> Vec<u8> {
    call(
        "buy(uint256,string)",
        &[Token::Uint(product_id), Token::String(memo.to_string())],
    )
}

// ERC-2771 forwarder

/// A validated forward request, ready for encoding.
#[derive(Debug, Clone)]
pub struct ForwardCall {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub deadline: u64,
    pub data: Bytes,
    pub signature: Bytes,
}

pub fn forwarder_execute(req: &ForwardCall) -> Vec<u8> {
    call(
        "execute((address,address,uint256,uint256,uint48,bytes,bytes))",
        &[Token::Tuple(vec![
            Token::Address(req.from),
            Token::Address(req.to),
            Token::Uint(req.value),
            Token::Uint(req.gas),
            Token::Uint(U256::from(req.deadline)),
            Token::Bytes(req.data.to_vec()),
            Token::Bytes(req.signature.to_vec()),
        ])],
    )
}

// Return-value decoding

pub fn decode_uint(data: &[u8]) -> Result<U256, String> {
    if data.len() < 32 {
        return Err(format!("Expected 32-byte word, got {} bytes", data.len()));
    }
    Ok(U256::from_big_endian(&data[..32]))
}

pub fn decode_u8(data: &[u8]) -> Result<u8, String> {
    let word = decode_uint(data)?;
    if word > U256::from(u8::MAX) {
        return Err(format!("Value out of u8 range: {}", word));
    }
    Ok(word.as_u32() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_selectors_match_known_values() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("decimals()"), [0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("allowance(address,address)"), [0xdd, 0x62, 0xed, 0x3e]);
    }

    #[test]
    fn transfer_calldata_layout() {
        let to: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let data = erc20_transfer(to, U256::from(1_000_000u64));

        // selector + two 32-byte words
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(&data[16..36], to.as_bytes());
    }

    #[test]
    fn charge_calldata_carries_memo() {
        let from: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();
        let data = escrow_charge(from, U256::from(42u64), "api call");

        assert_eq!(&data[..4], &selector("charge(address,uint256,string)"));
        // memo bytes appear in the dynamic tail
        let tail = &data[4..];
        let memo_pos = tail
            .windows("api call".len())
            .position(|w| w == "api call".as_bytes());
        assert!(memo_pos.is_some());
    }

    #[test]
    fn decode_uint_round_trips() {
        let mut word = [0u8; 32];
        U256::from(123456u64).to_big_endian(&mut word);
        assert_eq!(decode_uint(&word).unwrap(), U256::from(123456u64));
        assert_eq!(decode_u8(&word).err().unwrap().contains("range"), true);
        assert!(decode_uint(&[0u8; 4]).is_err());
    }
}
