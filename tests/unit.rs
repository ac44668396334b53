//! Unit tests for conversion-rates-prog
//!
//! These tests drive the program through `process_instruction`, covering
//! account validation, role gating, slab state and quotes.

use conversion_rates_prog::{
    constants::{ENGINE_OFF, HEADER_LEN, MAGIC, SLAB_LEN, VERSION},
    engine::{ConversionRates, TokenData, BUCKET_SIZE, PRECISION},
    error::ConversionRatesError,
    processor::process_instruction,
    state::{self, RatesConfig, SlabHeader},
    zc,
};
use memoffset::offset_of;
use solana_program::{
    account_info::AccountInfo, entrypoint::ProgramResult, program_error::ProgramError,
    pubkey::Pubkey,
};

// --- Harness ---

struct TestAccount {
    key: Pubkey,
    owner: Pubkey,
    lamports: u64,
    data: Vec<u8>,
    is_signer: bool,
    is_writable: bool,
}

impl TestAccount {
    fn new(key: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) -> Self {
        Self {
            key,
            owner,
            lamports,
            data,
            is_signer: false,
            is_writable: false,
        }
    }
    fn signer(mut self) -> Self {
        self.is_signer = true;
        self
    }
    fn writable(mut self) -> Self {
        self.is_writable = true;
        self
    }

    fn to_info<'a>(&'a mut self) -> AccountInfo<'a> {
        AccountInfo::new(
            &self.key,
            self.is_signer,
            self.is_writable,
            &mut self.lamports,
            &mut self.data,
            &self.owner,
            false,
            0,
        )
    }
}

// --- Encoders ---

fn encode_init(admin: &Pubkey, reserve: &Pubkey, valid_blocks: u64, quote_decimals: u8) -> Vec<u8> {
    let mut data = vec![0u8];
    data.extend_from_slice(admin.as_ref());
    data.extend_from_slice(reserve.as_ref());
    data.extend_from_slice(&valid_blocks.to_le_bytes());
    data.push(quote_decimals);
    data
}

fn encode_set_permission(role: u8, key: &Pubkey, grant: bool) -> Vec<u8> {
    let mut data = vec![1u8, role];
    data.extend_from_slice(key.as_ref());
    data.push(grant as u8);
    data
}

fn encode_key_only(tag: u8, key: &Pubkey) -> Vec<u8> {
    let mut data = vec![tag];
    data.extend_from_slice(key.as_ref());
    data
}

fn encode_add_token(token: &Pubkey, decimals: u8) -> Vec<u8> {
    let mut data = encode_key_only(3, token);
    data.push(decimals);
    data
}

fn encode_control_info(token: &Pubkey, resolution: u128, per_block: u128, total: u128) -> Vec<u8> {
    let mut data = encode_key_only(4, token);
    data.extend_from_slice(&resolution.to_le_bytes());
    data.extend_from_slice(&per_block.to_le_bytes());
    data.extend_from_slice(&total.to_le_bytes());
    data
}

fn encode_set_duration(duration: u64) -> Vec<u8> {
    let mut data = vec![7u8];
    data.extend_from_slice(&duration.to_le_bytes());
    data
}

fn push_compact(data: &mut Vec<u8>, buys: &[[i8; BUCKET_SIZE]], sells: &[[i8; BUCKET_SIZE]], block: u64, indices: &[u32]) {
    data.push(buys.len() as u8);
    for row in buys {
        data.extend(row.iter().map(|&v| v as u8));
    }
    data.push(sells.len() as u8);
    for row in sells {
        data.extend(row.iter().map(|&v| v as u8));
    }
    data.extend_from_slice(&block.to_le_bytes());
    data.push(indices.len() as u8);
    for i in indices {
        data.extend_from_slice(&i.to_le_bytes());
    }
}

fn encode_set_base_rate(
    tokens: &[Pubkey],
    buys: &[u128],
    sells: &[u128],
    compact_buys: &[[i8; BUCKET_SIZE]],
    compact_sells: &[[i8; BUCKET_SIZE]],
    block: u64,
    indices: &[u32],
) -> Vec<u8> {
    let mut data = vec![8u8, tokens.len() as u8];
    for t in tokens {
        data.extend_from_slice(t.as_ref());
    }
    data.push(buys.len() as u8);
    for b in buys {
        data.extend_from_slice(&b.to_le_bytes());
    }
    data.push(sells.len() as u8);
    for s in sells {
        data.extend_from_slice(&s.to_le_bytes());
    }
    push_compact(&mut data, compact_buys, compact_sells, block, indices);
    data
}

fn encode_set_compact(buys: &[[i8; BUCKET_SIZE]], sells: &[[i8; BUCKET_SIZE]], block: u64, indices: &[u32]) -> Vec<u8> {
    let mut data = vec![9u8];
    push_compact(&mut data, buys, sells, block, indices);
    data
}

fn encode_steps(tag: u8, token: &Pubkey, x_buy: &[i128], y_buy: &[i64], x_sell: &[i128], y_sell: &[i64]) -> Vec<u8> {
    let mut data = encode_key_only(tag, token);
    data.push(x_buy.len() as u8);
    x_buy.iter().for_each(|x| data.extend_from_slice(&x.to_le_bytes()));
    data.push(y_buy.len() as u8);
    y_buy.iter().for_each(|y| data.extend_from_slice(&y.to_le_bytes()));
    data.push(x_sell.len() as u8);
    x_sell.iter().for_each(|x| data.extend_from_slice(&x.to_le_bytes()));
    data.push(y_sell.len() as u8);
    y_sell.iter().for_each(|y| data.extend_from_slice(&y.to_le_bytes()));
    data
}

fn encode_record(token: &Pubkey, amount: i128, price_update_block: u64, current_block: u64) -> Vec<u8> {
    let mut data = encode_key_only(12, token);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&price_update_block.to_le_bytes());
    data.extend_from_slice(&current_block.to_le_bytes());
    data
}

fn encode_get_rate(token: &Pubkey, block: u64, is_buy: bool, qty: u128, is_src_qty: bool) -> Vec<u8> {
    let mut data = encode_key_only(13, token);
    data.extend_from_slice(&block.to_le_bytes());
    data.push(is_buy as u8);
    data.extend_from_slice(&qty.to_le_bytes());
    data.push(is_src_qty as u8);
    data
}

fn custom(e: ConversionRatesError) -> ProgramError {
    e.into()
}

// --- Fixture ---

const VALID_BLOCKS: u64 = 10;
const RATE: u128 = PRECISION / 1000;

struct RatesFixture {
    program_id: Pubkey,
    admin: Pubkey,
    operator: Pubkey,
    alerter: Pubkey,
    reserve: Pubkey,
    slab: TestAccount,
}

impl RatesFixture {
    fn new() -> Self {
        let program_id = Pubkey::new_unique();
        let slab = TestAccount::new(Pubkey::new_unique(), program_id, 1, vec![0u8; SLAB_LEN]).writable();
        Self {
            program_id,
            admin: Pubkey::new_unique(),
            operator: Pubkey::new_unique(),
            alerter: Pubkey::new_unique(),
            reserve: Pubkey::new_unique(),
            slab,
        }
    }

    fn run(&mut self, signer: &Pubkey, data: &[u8]) -> ProgramResult {
        let mut a_signer = TestAccount::new(*signer, Pubkey::default(), 0, vec![]).signer();
        let accounts = [a_signer.to_info(), self.slab.to_info()];
        process_instruction(&self.program_id, &accounts, data)
    }

    fn quote(&mut self, data: &[u8]) -> ProgramResult {
        let accounts = [self.slab.to_info()];
        process_instruction(&self.program_id, &accounts, data)
    }

    fn engine(&self) -> &ConversionRates {
        zc::engine_ref(&self.slab.data).unwrap()
    }

    /// Initialized slab with one operator and one alerter.
    fn initialized() -> Self {
        let mut f = Self::new();
        let (admin, reserve, operator, alerter) = (f.admin, f.reserve, f.operator, f.alerter);
        f.run(&admin, &encode_init(&admin, &reserve, VALID_BLOCKS, 18)).unwrap();
        f.run(&admin, &encode_set_permission(0, &operator, true)).unwrap();
        f.run(&admin, &encode_set_permission(1, &alerter, true)).unwrap();
        f
    }

    /// Lists, configures, enables and prices one 18-decimals token at block 100.
    fn list_priced(&mut self) -> Pubkey {
        let token = Pubkey::new_unique();
        let (admin, operator) = (self.admin, self.operator);
        self.run(&admin, &encode_add_token(&token, 18)).unwrap();
        self.run(&admin, &encode_control_info(&token, 10u128.pow(9), 10u128.pow(27), 10u128.pow(27))).unwrap();
        self.run(&admin, &encode_key_only(5, &token)).unwrap();
        let zero = [0i8; BUCKET_SIZE];
        self.run(
            &operator,
            &encode_set_base_rate(&[token], &[RATE], &[2 * RATE], &[zero], &[zero], 100, &[0]),
        )
        .unwrap();
        token
    }
}

// --- Tests ---

#[test]
fn test_slab_layout_offsets() {
    assert_eq!(offset_of!(SlabHeader, magic), 0);
    assert_eq!(offset_of!(SlabHeader, admin), 16);
    assert_eq!(offset_of!(RatesConfig, operators), 32);
    assert_eq!(offset_of!(ConversionRates, buckets), 24);
    assert_eq!(offset_of!(ConversionRates, tokens), 24 + 32 * 5);
    assert_eq!(offset_of!(TokenData, ordinal), 1212);
    assert_eq!(ENGINE_OFF, 352);
    assert!(ENGINE_OFF >= HEADER_LEN + core::mem::size_of::<RatesConfig>());
}

#[test]
fn test_init_writes_header_and_config() {
    let f = RatesFixture::initialized();
    let header = state::read_header(&f.slab.data);
    assert_eq!(header.magic, MAGIC);
    assert_eq!(header.version, VERSION);
    assert_eq!(header.admin, f.admin.to_bytes());
    let config = state::read_config(&f.slab.data);
    assert_eq!(config.reserve, f.reserve.to_bytes());
    assert_eq!(config.operators[0], f.operator.to_bytes());
    assert_eq!(config.alerters[0], f.alerter.to_bytes());
    assert_eq!(f.engine().valid_rate_duration_in_blocks, VALID_BLOCKS);
    assert_eq!(f.engine().quote_decimals, 18);
}

#[test]
fn test_init_twice_fails() {
    let mut f = RatesFixture::initialized();
    let (admin, reserve) = (f.admin, f.reserve);
    assert_eq!(
        f.run(&admin, &encode_init(&admin, &reserve, 5, 18)),
        Err(custom(ConversionRatesError::AlreadyInitialized))
    );
}

#[test]
fn test_init_account_checks() {
    let mut f = RatesFixture::new();
    let (admin, reserve) = (f.admin, f.reserve);
    let other = Pubkey::new_unique();

    // signer must be the admin named in the payload
    assert_eq!(
        f.run(&other, &encode_init(&admin, &reserve, 5, 18)),
        Err(ProgramError::InvalidArgument)
    );
    assert_eq!(
        f.run(&admin, &encode_init(&admin, &reserve, 5, 19)),
        Err(custom(ConversionRatesError::EngineInvalidDecimals))
    );

    f.slab.owner = Pubkey::new_unique();
    assert_eq!(
        f.run(&admin, &encode_init(&admin, &reserve, 5, 18)),
        Err(ProgramError::IllegalOwner)
    );

    let mut f = RatesFixture::new();
    f.slab.data.truncate(SLAB_LEN - 1);
    assert_eq!(
        f.run(&admin, &encode_init(&admin, &reserve, 5, 18)),
        Err(custom(ConversionRatesError::InvalidSlabLen))
    );
}

#[test]
fn test_writes_need_signer_and_initialized_slab() {
    let mut f = RatesFixture::new();
    let admin = f.admin;
    let token = Pubkey::new_unique();
    assert_eq!(
        f.run(&admin, &encode_add_token(&token, 18)),
        Err(custom(ConversionRatesError::NotInitialized))
    );

    let mut f = RatesFixture::initialized();
    let mut a_admin = TestAccount::new(f.admin, Pubkey::default(), 0, vec![]);
    let accounts = [a_admin.to_info(), f.slab.to_info()];
    assert_eq!(
        process_instruction(&f.program_id, &accounts, &encode_add_token(&token, 18)),
        Err(custom(ConversionRatesError::ExpectedSigner))
    );
}

#[test]
fn test_role_gating() {
    let mut f = RatesFixture::initialized();
    let (admin, operator, alerter, reserve) = (f.admin, f.operator, f.alerter, f.reserve);
    let token = f.list_priced();
    let unauthorized = Err(custom(ConversionRatesError::EngineUnauthorized));

    assert_eq!(f.run(&operator, &encode_add_token(&Pubkey::new_unique(), 18)), unauthorized);
    assert_eq!(f.run(&operator, &encode_set_duration(3)), unauthorized);
    assert_eq!(f.run(&operator, &encode_set_permission(0, &operator, true)), unauthorized);
    assert_eq!(f.run(&admin, &encode_set_compact(&[], &[], 1, &[])), unauthorized);
    assert_eq!(f.run(&admin, &encode_key_only(6, &token)), unauthorized);
    assert_eq!(f.run(&operator, &encode_record(&token, 1, 100, 100)), unauthorized);

    f.run(&alerter, &encode_key_only(6, &token)).unwrap();
    assert_eq!(f.engine().get_token_basic_data(&token.to_bytes()), (true, false));
    f.run(&reserve, &encode_record(&token, 1, 100, 100)).unwrap();
}

#[test]
fn test_revoked_operator_loses_access() {
    let mut f = RatesFixture::initialized();
    let (admin, operator) = (f.admin, f.operator);
    f.run(&admin, &encode_set_permission(0, &operator, false)).unwrap();
    assert_eq!(
        f.run(&operator, &encode_set_compact(&[], &[], 1, &[])),
        Err(custom(ConversionRatesError::EngineUnauthorized))
    );
}

#[test]
fn test_permission_table_full() {
    let mut f = RatesFixture::initialized();
    let admin = f.admin;
    for _ in 0..3 {
        f.run(&admin, &encode_set_permission(1, &Pubkey::new_unique(), true)).unwrap();
    }
    assert_eq!(
        f.run(&admin, &encode_set_permission(1, &Pubkey::new_unique(), true)),
        Err(custom(ConversionRatesError::PermissionTableFull))
    );
}

#[test]
fn test_set_reserve_address() {
    let mut f = RatesFixture::initialized();
    let (admin, old_reserve) = (f.admin, f.reserve);
    let token = f.list_priced();
    let new_reserve = Pubkey::new_unique();
    f.run(&admin, &encode_key_only(2, &new_reserve)).unwrap();
    assert_eq!(
        f.run(&old_reserve, &encode_record(&token, 1, 100, 100)),
        Err(custom(ConversionRatesError::EngineUnauthorized))
    );
    f.run(&new_reserve, &encode_record(&token, 1, 100, 100)).unwrap();
}

#[test]
fn test_listing_flow() {
    let mut f = RatesFixture::initialized();
    let admin = f.admin;
    let token = Pubkey::new_unique();
    assert_eq!(
        f.run(&admin, &encode_key_only(5, &token)),
        Err(custom(ConversionRatesError::EngineNotListed))
    );
    f.run(&admin, &encode_add_token(&token, 6)).unwrap();
    assert_eq!(
        f.run(&admin, &encode_add_token(&token, 6)),
        Err(custom(ConversionRatesError::EngineAlreadyListed))
    );
    assert_eq!(
        f.run(&admin, &encode_key_only(5, &token)),
        Err(custom(ConversionRatesError::EngineControlInfoRequired))
    );
    assert_eq!(
        f.run(&admin, &encode_control_info(&token, 0, 1, 1)),
        Err(custom(ConversionRatesError::EngineZeroParameter))
    );
    f.run(&admin, &encode_control_info(&token, 10, 1000, 2000)).unwrap();
    f.run(&admin, &encode_key_only(5, &token)).unwrap();

    let engine = f.engine();
    assert_eq!(engine.get_listed_tokens(), vec![token.to_bytes()]);
    let info = engine.get_token_control_info(&token.to_bytes());
    assert_eq!(info.minimal_record_resolution.get(), 10);
    assert_eq!(info.max_per_block_imbalance, 100);
    assert_eq!(info.max_total_imbalance, 200);
}

#[test]
fn test_base_rate_and_compact_quotes() {
    let mut f = RatesFixture::initialized();
    let operator = f.operator;
    let token = f.list_priced();
    let t = token.to_bytes();
    assert_eq!(f.engine().get_rate(&t, 100, true, PRECISION), Ok(RATE));
    assert_eq!(f.engine().get_basic_rate(&t, false), Ok(2 * RATE));

    let mut buys = [0i8; BUCKET_SIZE];
    buys[0] = 25;
    f.run(&operator, &encode_set_compact(&[buys], &[[0; BUCKET_SIZE]], 104, &[0])).unwrap();
    assert_eq!(f.engine().get_rate_update_block(&t), Ok(104));
    assert_eq!(f.engine().get_rate(&t, 104, true, 0), Ok(RATE * 10_250 / 10_000));
    assert_eq!(f.engine().get_rate(&t, 104 + VALID_BLOCKS + 1, true, 0), Ok(0));

    f.quote(&encode_get_rate(&token, 104, true, PRECISION, true)).unwrap();
}

#[test]
fn test_compact_errors_surface() {
    let mut f = RatesFixture::initialized();
    let operator = f.operator;
    f.list_priced();
    let row = [0i8; BUCKET_SIZE];
    assert_eq!(
        f.run(&operator, &encode_set_compact(&[row], &[row], 0xf_ffff_fff1, &[0])),
        Err(custom(ConversionRatesError::EngineBlockOverflow))
    );
    f.run(&operator, &encode_set_compact(&[row], &[row], 0xffff_fffe, &[0])).unwrap();
    assert_eq!(
        f.run(&operator, &encode_set_compact(&[row], &[], 5, &[0])),
        Err(custom(ConversionRatesError::EngineLengthMismatch))
    );
    assert_eq!(
        f.run(&operator, &encode_set_compact(&[row], &[row], 5, &[1])),
        Err(custom(ConversionRatesError::EngineInvalidIndices))
    );
}

#[test]
fn test_set_base_rate_rejects_unlisted_without_writing() {
    let mut f = RatesFixture::initialized();
    let operator = f.operator;
    let token = f.list_priced();
    let stranger = Pubkey::new_unique();
    assert_eq!(
        f.run(&operator, &encode_set_base_rate(&[token, stranger], &[1, 2], &[3, 4], &[], &[], 100, &[])),
        Err(custom(ConversionRatesError::EngineUnlistedToken))
    );
    assert_eq!(f.engine().get_basic_rate(&token.to_bytes(), true), Ok(RATE));
}

#[test]
fn test_step_functions_through_program() {
    let mut f = RatesFixture::initialized();
    let operator = f.operator;
    let token = f.list_priced();
    let t = token.to_bytes();
    f.run(
        &operator,
        &encode_steps(10, &token, &[10i128.pow(15), 10i128.pow(16)], &[0, -20], &[], &[]),
    )
    .unwrap();
    assert_eq!(f.engine().get_step_function_data(&t, 0, 0), Ok(2));
    assert_eq!(f.engine().get_step_function_data(&t, 3, 1), Ok(-20));
    assert_eq!(f.engine().get_rate(&t, 100, true, 2 * PRECISION), Ok(RATE * 9_980 / 10_000));

    let eleven: Vec<i128> = (0..11).collect();
    assert_eq!(
        f.run(&operator, &encode_steps(11, &token, &eleven, &[0; 11], &[], &[])),
        Err(custom(ConversionRatesError::EngineTooManySteps))
    );
    assert_eq!(
        f.run(&operator, &encode_steps(11, &token, &[1, 2], &[0], &[], &[])),
        Err(custom(ConversionRatesError::EngineLengthMismatch))
    );
}

#[test]
fn test_imbalance_cap_through_program() {
    let mut f = RatesFixture::initialized();
    let (admin, reserve) = (f.admin, f.reserve);
    let token = f.list_priced();
    let t = token.to_bytes();
    f.run(&admin, &encode_control_info(&token, 2, 4000, 1_000_000)).unwrap();

    f.run(&reserve, &encode_record(&token, -200, 100, 102)).unwrap();
    f.run(&reserve, &encode_record(&token, -28, 100, 102)).unwrap();
    assert_eq!(f.engine().get_imbalance(&t, 100, 102), Ok((-114, -114)));

    // 1886 resolution units of per-block room left
    assert!(f.engine().get_rate(&t, 102, false, 3773).unwrap() > 0);
    assert_eq!(f.engine().get_rate(&t, 102, false, 3774), Ok(0));
    f.quote(&encode_get_rate(&token, 102, false, 3774, true)).unwrap();
}

#[test]
fn test_valid_duration_update() {
    let mut f = RatesFixture::initialized();
    let admin = f.admin;
    let token = f.list_priced();
    let t = token.to_bytes();
    assert_eq!(f.engine().get_rate(&t, 111, true, 0), Ok(0));
    f.run(&admin, &encode_set_duration(20)).unwrap();
    assert_eq!(f.engine().get_rate(&t, 111, true, 0), Ok(RATE));
}

#[test]
fn test_get_rate_errors_propagate() {
    let mut f = RatesFixture::initialized();
    let token = f.list_priced();
    assert_eq!(
        f.quote(&encode_get_rate(&token, 100, true, 10u128.pow(28) + 1, true)),
        Err(custom(ConversionRatesError::EngineInvalidQuantity))
    );
    // unknown tokens quote zero rather than fail
    f.quote(&encode_get_rate(&Pubkey::new_unique(), 100, true, 1, true)).unwrap();
}

#[test]
fn test_malformed_instruction() {
    let mut f = RatesFixture::initialized();
    let admin = f.admin;
    assert_eq!(f.run(&admin, &[42]), Err(ProgramError::InvalidInstructionData));
    assert_eq!(f.run(&admin, &[3, 1, 2]), Err(ProgramError::InvalidInstructionData));
}
