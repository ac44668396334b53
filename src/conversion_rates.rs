//! Conversion rates: single-file Solana program around the rate engine.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

pub mod engine;

// 1. mod constants
pub mod constants {
    use core::mem::{align_of, size_of};
    use crate::engine::ConversionRates;
    use crate::state::RatesConfig;

    pub const MAGIC: u64 = 0x434f4e5652415445; // "CONVRATE"
    pub const VERSION: u32 = 1;

    pub const HEADER_LEN: usize = 64;
    pub const CONFIG_LEN: usize = size_of::<RatesConfig>();
    pub const ENGINE_ALIGN: usize = align_of::<ConversionRates>();

    pub const fn align_up(x: usize, a: usize) -> usize {
        (x + (a - 1)) & !(a - 1)
    }

    pub const ENGINE_OFF: usize = align_up(HEADER_LEN + CONFIG_LEN, ENGINE_ALIGN);
    pub const ENGINE_LEN: usize = size_of::<ConversionRates>();
    pub const SLAB_LEN: usize = ENGINE_OFF + ENGINE_LEN;

    pub const MAX_OPERATORS: usize = 4;
    pub const MAX_ALERTERS: usize = 4;
}

// 2. mod zc (zero-copy views)
pub mod zc {
    use solana_program::program_error::ProgramError;
    use crate::constants::{ENGINE_LEN, ENGINE_OFF};
    use crate::engine::ConversionRates;

    #[inline]
    pub fn engine_ref(data: &[u8]) -> Result<&ConversionRates, ProgramError> {
        let bytes = data
            .get(ENGINE_OFF..ENGINE_OFF + ENGINE_LEN)
            .ok_or(ProgramError::InvalidAccountData)?;
        bytemuck::try_from_bytes(bytes).map_err(|_| ProgramError::InvalidAccountData)
    }

    #[inline]
    pub fn engine_mut(data: &mut [u8]) -> Result<&mut ConversionRates, ProgramError> {
        let bytes = data
            .get_mut(ENGINE_OFF..ENGINE_OFF + ENGINE_LEN)
            .ok_or(ProgramError::InvalidAccountData)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(|_| ProgramError::InvalidAccountData)
    }
}

// 3. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use solana_program::program_error::ProgramError;
    use crate::engine::RateError;

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum ConversionRatesError {
        InvalidVersion,
        AlreadyInitialized,
        NotInitialized,
        InvalidSlabLen,
        ExpectedSigner,
        ExpectedWritable,
        PermissionTableFull,
        // Engine errors mapped:
        EngineUnauthorized,
        EngineUnlistedToken,
        EngineNotListed,
        EngineAlreadyListed,
        EngineControlInfoRequired,
        EngineZeroParameter,
        EngineOverflow,
        EngineCastOverflow,
        EngineInvalidRate,
        EngineBpsOutOfRange,
        EngineInvalidQuantity,
        EngineInvalidDecimals,
        EngineLengthMismatch,
        EngineTooManySteps,
        EngineStepsNotMonotonic,
        EngineInvalidCommand,
        EngineInvalidIndices,
        EngineBlockOverflow,
        EngineTokenTableFull,
    }

    impl From<ConversionRatesError> for ProgramError {
        fn from(e: ConversionRatesError) -> Self {
            ProgramError::Custom(e as u32)
        }
    }

    pub fn map_rate_error(e: RateError) -> ProgramError {
        let err = match e {
            RateError::Unauthorized => ConversionRatesError::EngineUnauthorized,
            RateError::UnlistedToken => ConversionRatesError::EngineUnlistedToken,
            RateError::NotListed => ConversionRatesError::EngineNotListed,
            RateError::AlreadyListed => ConversionRatesError::EngineAlreadyListed,
            RateError::ControlInfoRequired => ConversionRatesError::EngineControlInfoRequired,
            RateError::ZeroParameter => ConversionRatesError::EngineZeroParameter,
            RateError::Overflow => ConversionRatesError::EngineOverflow,
            RateError::CastOverflow => ConversionRatesError::EngineCastOverflow,
            RateError::InvalidRate => ConversionRatesError::EngineInvalidRate,
            RateError::BpsOutOfRange => ConversionRatesError::EngineBpsOutOfRange,
            RateError::InvalidQuantity => ConversionRatesError::EngineInvalidQuantity,
            RateError::InvalidDecimals => ConversionRatesError::EngineInvalidDecimals,
            RateError::LengthMismatch => ConversionRatesError::EngineLengthMismatch,
            RateError::TooManySteps => ConversionRatesError::EngineTooManySteps,
            RateError::StepsNotMonotonic => ConversionRatesError::EngineStepsNotMonotonic,
            RateError::InvalidCommand => ConversionRatesError::EngineInvalidCommand,
            RateError::InvalidIndices => ConversionRatesError::EngineInvalidIndices,
            RateError::BlockOverflow => ConversionRatesError::EngineBlockOverflow,
            RateError::TokenTableFull => ConversionRatesError::EngineTokenTableFull,
        };
        ProgramError::Custom(err as u32)
    }
}

// 4. mod ix
pub mod ix {
    use alloc::vec::Vec;
    use arrayref::array_ref;
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};
    use crate::engine::BUCKET_SIZE;

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
    pub enum Role {
        Operator = 0,
        Alerter = 1,
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    pub struct StepArgs {
        pub x_buy: Vec<i128>,
        pub y_buy: Vec<i64>,
        pub x_sell: Vec<i128>,
        pub y_sell: Vec<i64>,
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    pub struct CompactArgs {
        pub buys: Vec<[i8; BUCKET_SIZE]>,
        pub sells: Vec<[i8; BUCKET_SIZE]>,
        pub block: u64,
        pub indices: Vec<u32>,
    }

    #[derive(Debug, PartialEq, Eq)]
    pub enum Instruction {
        InitRates {
            admin: Pubkey,
            reserve: Pubkey,
            valid_rate_duration_in_blocks: u64,
            quote_decimals: u8,
        },
        SetPermission { role: Role, key: Pubkey, grant: bool },
        SetReserveAddress { reserve: Pubkey },
        AddToken { token: Pubkey, decimals: u8 },
        SetTokenControlInfo {
            token: Pubkey,
            minimal_record_resolution: u128,
            max_per_block_imbalance: u128,
            max_total_imbalance: u128,
        },
        EnableTokenTrade { token: Pubkey },
        DisableTokenTrade { token: Pubkey },
        SetValidRateDurationInBlocks { duration: u64 },
        SetBaseRate {
            tokens: Vec<[u8; 32]>,
            buys: Vec<u128>,
            sells: Vec<u128>,
            compact: CompactArgs,
        },
        SetCompactData { compact: CompactArgs },
        SetQtyStepFunction { token: Pubkey, steps: StepArgs },
        SetImbalanceStepFunction { token: Pubkey, steps: StepArgs },
        RecordImbalance {
            token: Pubkey,
            buy_amount: i128,
            price_update_block: u64,
            current_block: u64,
        },
        GetRate {
            token: Pubkey,
            current_block: u64,
            is_buy: bool,
            qty: u128,
            is_src_qty: bool,
        },
    }

    impl Instruction {
        pub fn decode(input: &[u8]) -> Result<Self, ProgramError> {
            let (&tag, mut rest) = input.split_first().ok_or(ProgramError::InvalidInstructionData)?;

            let ix = match tag {
                0 => Instruction::InitRates {
                    admin: read_pubkey(&mut rest)?,
                    reserve: read_pubkey(&mut rest)?,
                    valid_rate_duration_in_blocks: read_u64(&mut rest)?,
                    quote_decimals: read_u8(&mut rest)?,
                },
                1 => Instruction::SetPermission {
                    role: Role::from_u8(read_u8(&mut rest)?).ok_or(ProgramError::InvalidInstructionData)?,
                    key: read_pubkey(&mut rest)?,
                    grant: read_bool(&mut rest)?,
                },
                2 => Instruction::SetReserveAddress { reserve: read_pubkey(&mut rest)? },
                3 => Instruction::AddToken {
                    token: read_pubkey(&mut rest)?,
                    decimals: read_u8(&mut rest)?,
                },
                4 => Instruction::SetTokenControlInfo {
                    token: read_pubkey(&mut rest)?,
                    minimal_record_resolution: read_u128(&mut rest)?,
                    max_per_block_imbalance: read_u128(&mut rest)?,
                    max_total_imbalance: read_u128(&mut rest)?,
                },
                5 => Instruction::EnableTokenTrade { token: read_pubkey(&mut rest)? },
                6 => Instruction::DisableTokenTrade { token: read_pubkey(&mut rest)? },
                7 => Instruction::SetValidRateDurationInBlocks { duration: read_u64(&mut rest)? },
                8 => Instruction::SetBaseRate {
                    tokens: read_vec(&mut rest, |i| read_pubkey(i).map(|k| k.to_bytes()))?,
                    buys: read_vec(&mut rest, read_u128)?,
                    sells: read_vec(&mut rest, read_u128)?,
                    compact: read_compact(&mut rest)?,
                },
                9 => Instruction::SetCompactData { compact: read_compact(&mut rest)? },
                10 => Instruction::SetQtyStepFunction {
                    token: read_pubkey(&mut rest)?,
                    steps: read_steps(&mut rest)?,
                },
                11 => Instruction::SetImbalanceStepFunction {
                    token: read_pubkey(&mut rest)?,
                    steps: read_steps(&mut rest)?,
                },
                12 => Instruction::RecordImbalance {
                    token: read_pubkey(&mut rest)?,
                    buy_amount: read_i128(&mut rest)?,
                    price_update_block: read_u64(&mut rest)?,
                    current_block: read_u64(&mut rest)?,
                },
                13 => Instruction::GetRate {
                    token: read_pubkey(&mut rest)?,
                    current_block: read_u64(&mut rest)?,
                    is_buy: read_bool(&mut rest)?,
                    qty: read_u128(&mut rest)?,
                    is_src_qty: read_bool(&mut rest)?,
                },
                _ => return Err(ProgramError::InvalidInstructionData),
            };
            Ok(ix)
        }
    }

    fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProgramError> {
        if input.len() < n {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(n);
        *input = rest;
        Ok(bytes)
    }

    fn read_u8(input: &mut &[u8]) -> Result<u8, ProgramError> {
        let (&val, rest) = input.split_first().ok_or(ProgramError::InvalidInstructionData)?;
        *input = rest;
        Ok(val)
    }

    fn read_bool(input: &mut &[u8]) -> Result<bool, ProgramError> {
        match read_u8(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ProgramError::InvalidInstructionData),
        }
    }

    fn read_u32(input: &mut &[u8]) -> Result<u32, ProgramError> {
        Ok(u32::from_le_bytes(*array_ref![take(input, 4)?, 0, 4]))
    }

    fn read_u64(input: &mut &[u8]) -> Result<u64, ProgramError> {
        Ok(u64::from_le_bytes(*array_ref![take(input, 8)?, 0, 8]))
    }

    fn read_i64(input: &mut &[u8]) -> Result<i64, ProgramError> {
        Ok(i64::from_le_bytes(*array_ref![take(input, 8)?, 0, 8]))
    }

    fn read_i128(input: &mut &[u8]) -> Result<i128, ProgramError> {
        Ok(i128::from_le_bytes(*array_ref![take(input, 16)?, 0, 16]))
    }

    fn read_u128(input: &mut &[u8]) -> Result<u128, ProgramError> {
        Ok(u128::from_le_bytes(*array_ref![take(input, 16)?, 0, 16]))
    }

    fn read_pubkey(input: &mut &[u8]) -> Result<Pubkey, ProgramError> {
        Ok(Pubkey::new_from_array(*array_ref![take(input, 32)?, 0, 32]))
    }

    fn read_compact_row(input: &mut &[u8]) -> Result<[i8; BUCKET_SIZE], ProgramError> {
        let raw = array_ref![take(input, BUCKET_SIZE)?, 0, BUCKET_SIZE];
        Ok(raw.map(|b| b as i8))
    }

    /// u8 length prefix, then the items.
    fn read_vec<T>(
        input: &mut &[u8],
        item: impl Fn(&mut &[u8]) -> Result<T, ProgramError>,
    ) -> Result<Vec<T>, ProgramError> {
        let n = read_u8(input)? as usize;
        (0..n).map(|_| item(&mut *input)).collect()
    }

    fn read_compact(input: &mut &[u8]) -> Result<CompactArgs, ProgramError> {
        Ok(CompactArgs {
            buys: read_vec(input, read_compact_row)?,
            sells: read_vec(input, read_compact_row)?,
            block: read_u64(input)?,
            indices: read_vec(input, read_u32)?,
        })
    }

    fn read_steps(input: &mut &[u8]) -> Result<StepArgs, ProgramError> {
        Ok(StepArgs {
            x_buy: read_vec(input, read_i128)?,
            y_buy: read_vec(input, read_i64)?,
            x_sell: read_vec(input, read_i128)?,
            y_sell: read_vec(input, read_i64)?,
        })
    }
}

// 5. mod accounts
pub mod accounts {
    use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey};
    use crate::error::ConversionRatesError;

    pub fn expect_len(accounts: &[AccountInfo], n: usize) -> Result<(), ProgramError> {
        if accounts.len() < n {
            return Err(ProgramError::NotEnoughAccountKeys);
        }
        Ok(())
    }

    pub fn expect_signer(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_signer {
            return Err(ConversionRatesError::ExpectedSigner.into());
        }
        Ok(())
    }

    pub fn expect_writable(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_writable {
            return Err(ConversionRatesError::ExpectedWritable.into());
        }
        Ok(())
    }

    pub fn expect_owner(ai: &AccountInfo, owner: &Pubkey) -> Result<(), ProgramError> {
        if ai.owner != owner {
            return Err(ProgramError::IllegalOwner);
        }
        Ok(())
    }

    pub fn expect_key(ai: &AccountInfo, expected: &Pubkey) -> Result<(), ProgramError> {
        if ai.key != expected {
            return Err(ProgramError::InvalidArgument);
        }
        Ok(())
    }
}

// 6. mod state
pub mod state {
    use bytemuck::{Pod, Zeroable};
    use core::cell::RefMut;
    use solana_program::account_info::AccountInfo;
    use solana_program::program_error::ProgramError;
    use crate::constants::{CONFIG_LEN, HEADER_LEN, MAX_ALERTERS, MAX_OPERATORS};
    use crate::engine::AccessControl;
    use crate::error::ConversionRatesError;
    use crate::ix::Role;

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct SlabHeader {
        pub magic: u64,
        pub version: u32,
        pub _padding: [u8; 4],
        pub admin: [u8; 32],
        pub _reserved: [u8; 16],
    }

    /// Role tables. An all-zero key marks a free slot.
    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct RatesConfig {
        pub reserve: [u8; 32],
        pub operators: [[u8; 32]; MAX_OPERATORS],
        pub alerters: [[u8; 32]; MAX_ALERTERS],
    }

    const EMPTY: [u8; 32] = [0; 32];

    impl RatesConfig {
        fn table_mut(&mut self, role: Role) -> &mut [[u8; 32]] {
            match role {
                Role::Operator => &mut self.operators,
                Role::Alerter => &mut self.alerters,
            }
        }

        /// Granting twice is a no-op; revoking an absent key is a no-op.
        pub fn set_role(&mut self, role: Role, key: &[u8; 32], grant: bool) -> Result<(), ProgramError> {
            if key == &EMPTY {
                return Err(ProgramError::InvalidArgument);
            }
            let table = self.table_mut(role);
            if grant {
                if table.contains(key) {
                    return Ok(());
                }
                let slot = table
                    .iter_mut()
                    .find(|k| **k == EMPTY)
                    .ok_or(ConversionRatesError::PermissionTableFull)?;
                *slot = *key;
            } else {
                for k in table.iter_mut().filter(|k| *k == key) {
                    *k = EMPTY;
                }
            }
            Ok(())
        }
    }

    /// Role snapshot taken from the slab before the engine is borrowed.
    pub struct Roles {
        pub admin: [u8; 32],
        pub config: RatesConfig,
    }

    impl Roles {
        pub fn load(data: &[u8]) -> Self {
            Self {
                admin: read_header(data).admin,
                config: read_config(data),
            }
        }
    }

    fn holds(key: &[u8; 32], table: &[[u8; 32]]) -> bool {
        key != &EMPTY && table.contains(key)
    }

    impl AccessControl for Roles {
        fn is_admin(&self, key: &[u8; 32]) -> bool {
            key != &EMPTY && key == &self.admin
        }
        fn is_operator(&self, key: &[u8; 32]) -> bool {
            holds(key, &self.config.operators)
        }
        fn is_alerter(&self, key: &[u8; 32]) -> bool {
            holds(key, &self.config.alerters)
        }
        fn is_reserve(&self, key: &[u8; 32]) -> bool {
            key != &EMPTY && key == &self.config.reserve
        }
    }

    pub fn slab_data_mut<'a, 'b>(ai: &'b AccountInfo<'a>) -> Result<RefMut<'b, &'a mut [u8]>, ProgramError> {
        Ok(ai.try_borrow_mut_data()?)
    }

    pub fn read_header(data: &[u8]) -> SlabHeader {
        let mut h = SlabHeader::zeroed();
        let src = &data[..HEADER_LEN];
        let dst = bytemuck::bytes_of_mut(&mut h);
        dst.copy_from_slice(src);
        h
    }

    pub fn write_header(data: &mut [u8], h: &SlabHeader) {
        let src = bytemuck::bytes_of(h);
        let dst = &mut data[..HEADER_LEN];
        dst.copy_from_slice(src);
    }

    pub fn read_config(data: &[u8]) -> RatesConfig {
        let mut c = RatesConfig::zeroed();
        let src = &data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        let dst = bytemuck::bytes_of_mut(&mut c);
        dst.copy_from_slice(src);
        c
    }

    pub fn write_config(data: &mut [u8], c: &RatesConfig) {
        let src = bytemuck::bytes_of(c);
        let dst = &mut data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        dst.copy_from_slice(src);
    }
}

// 7. mod processor
pub mod processor {
    use alloc::format;
    use bytemuck::Zeroable;
    use core::cell::RefMut;
    use solana_program::{
        account_info::AccountInfo, entrypoint::ProgramResult, msg, program::set_return_data,
        program_error::ProgramError, pubkey::Pubkey,
    };
    use crate::{
        accounts,
        constants::{MAGIC, SLAB_LEN, VERSION},
        engine::AccessControl,
        error::{map_rate_error, ConversionRatesError},
        ix::Instruction,
        state::{self, RatesConfig, Roles, SlabHeader},
        zc,
    };

    fn slab_guard(program_id: &Pubkey, slab: &AccountInfo, data: &[u8]) -> Result<(), ProgramError> {
        accounts::expect_owner(slab, program_id)?;
        if data.len() != SLAB_LEN {
            return Err(ConversionRatesError::InvalidSlabLen.into());
        }
        Ok(())
    }

    fn require_initialized(data: &[u8]) -> Result<(), ProgramError> {
        let h = state::read_header(data);
        if h.magic != MAGIC {
            return Err(ConversionRatesError::NotInitialized.into());
        }
        if h.version != VERSION {
            return Err(ConversionRatesError::InvalidVersion.into());
        }
        Ok(())
    }

    /// `[signer, slab (writable)]`, slab owned, sized and initialized.
    fn writable_slab<'a, 'b>(
        program_id: &Pubkey,
        accounts: &'b [AccountInfo<'a>],
    ) -> Result<(&'b AccountInfo<'a>, RefMut<'b, &'a mut [u8]>), ProgramError> {
        accounts::expect_len(accounts, 2)?;
        let a_signer = &accounts[0];
        let a_slab = &accounts[1];

        accounts::expect_signer(a_signer)?;
        accounts::expect_writable(a_slab)?;

        let data = state::slab_data_mut(a_slab)?;
        slab_guard(program_id, a_slab, &data)?;
        require_initialized(&data)?;
        Ok((a_signer, data))
    }

    pub fn process_instruction<'a, 'b>(
        program_id: &Pubkey,
        accounts: &'b [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = Instruction::decode(instruction_data)?;

        match instruction {
            Instruction::InitRates { admin, reserve, valid_rate_duration_in_blocks, quote_decimals } => {
                accounts::expect_len(accounts, 2)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_admin)?;
                accounts::expect_key(a_admin, &admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;

                let header = state::read_header(&data);
                if header.magic == MAGIC {
                    return Err(ConversionRatesError::AlreadyInitialized.into());
                }

                data.fill(0);
                zc::engine_mut(&mut data)?
                    .init(valid_rate_duration_in_blocks, quote_decimals)
                    .map_err(map_rate_error)?;

                let mut config = RatesConfig::zeroed();
                config.reserve = reserve.to_bytes();
                state::write_config(&mut data, &config);

                let new_header = SlabHeader {
                    magic: MAGIC,
                    version: VERSION,
                    _padding: [0; 4],
                    admin: admin.to_bytes(),
                    _reserved: [0; 16],
                };
                state::write_header(&mut data, &new_header);
                msg!("InitRates: admin={} reserve={} valid_blocks={}", admin, reserve, valid_rate_duration_in_blocks);
            },
            Instruction::SetPermission { role, key, grant } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                if !roles.is_admin(&a_signer.key.to_bytes()) {
                    return Err(ConversionRatesError::EngineUnauthorized.into());
                }
                let mut config = roles.config;
                config.set_role(role, &key.to_bytes(), grant)?;
                state::write_config(&mut data, &config);
                msg!("SetPermission: {:?} {} grant={}", role, key, grant);
            },
            Instruction::SetReserveAddress { reserve } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                if !roles.is_admin(&a_signer.key.to_bytes()) {
                    return Err(ConversionRatesError::EngineUnauthorized.into());
                }
                let mut config = roles.config;
                config.reserve = reserve.to_bytes();
                state::write_config(&mut data, &config);
                msg!("SetReserveAddress: {}", reserve);
            },
            Instruction::AddToken { token, decimals } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                let engine = zc::engine_mut(&mut data)?;
                engine
                    .add_token(&roles, &a_signer.key.to_bytes(), &token.to_bytes(), decimals)
                    .map_err(map_rate_error)?;
                msg!("AddToken: {} decimals={} listed={}", token, decimals, engine.num_listed);
            },
            Instruction::SetTokenControlInfo {
                token, minimal_record_resolution, max_per_block_imbalance, max_total_imbalance,
            } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                let engine = zc::engine_mut(&mut data)?;
                engine
                    .set_token_control_info(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &token.to_bytes(),
                        minimal_record_resolution,
                        max_per_block_imbalance,
                        max_total_imbalance,
                    )
                    .map_err(map_rate_error)?;
                msg!("SetTokenControlInfo: {} resolution={}", token, minimal_record_resolution);
            },
            Instruction::EnableTokenTrade { token } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .enable_token_trade(&roles, &a_signer.key.to_bytes(), &token.to_bytes())
                    .map_err(map_rate_error)?;
                msg!("EnableTokenTrade: {}", token);
            },
            Instruction::DisableTokenTrade { token } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .disable_token_trade(&roles, &a_signer.key.to_bytes(), &token.to_bytes())
                    .map_err(map_rate_error)?;
                msg!("DisableTokenTrade: {}", token);
            },
            Instruction::SetValidRateDurationInBlocks { duration } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .set_valid_rate_duration_in_blocks(&roles, &a_signer.key.to_bytes(), duration)
                    .map_err(map_rate_error)?;
                msg!("SetValidRateDurationInBlocks: {}", duration);
            },
            Instruction::SetBaseRate { tokens, buys, sells, compact } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .set_base_rate(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &tokens,
                        &buys,
                        &sells,
                        &compact.buys,
                        &compact.sells,
                        compact.block,
                        &compact.indices,
                    )
                    .map_err(map_rate_error)?;
                msg!("SetBaseRate: tokens={} buckets={} block={}", tokens.len(), compact.indices.len(), compact.block);
            },
            Instruction::SetCompactData { compact } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .set_compact_data(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &compact.buys,
                        &compact.sells,
                        compact.block,
                        &compact.indices,
                    )
                    .map_err(map_rate_error)?;
                msg!("SetCompactData: buckets={} block={}", compact.indices.len(), compact.block);
            },
            Instruction::SetQtyStepFunction { token, steps } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .set_qty_step_function(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &token.to_bytes(),
                        &steps.x_buy,
                        &steps.y_buy,
                        &steps.x_sell,
                        &steps.y_sell,
                    )
                    .map_err(map_rate_error)?;
                msg!("SetQtyStepFunction: {} buy={} sell={}", token, steps.x_buy.len(), steps.x_sell.len());
            },
            Instruction::SetImbalanceStepFunction { token, steps } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .set_imbalance_step_function(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &token.to_bytes(),
                        &steps.x_buy,
                        &steps.y_buy,
                        &steps.x_sell,
                        &steps.y_sell,
                    )
                    .map_err(map_rate_error)?;
                msg!("SetImbalanceStepFunction: {} buy={} sell={}", token, steps.x_buy.len(), steps.x_sell.len());
            },
            Instruction::RecordImbalance { token, buy_amount, price_update_block, current_block } => {
                let (a_signer, mut data) = writable_slab(program_id, accounts)?;
                let roles = Roles::load(&data);
                zc::engine_mut(&mut data)?
                    .record_imbalance(
                        &roles,
                        &a_signer.key.to_bytes(),
                        &token.to_bytes(),
                        buy_amount,
                        price_update_block,
                        current_block,
                    )
                    .map_err(map_rate_error)?;
                msg!("RecordImbalance: {} amount={} block={}", token, buy_amount, current_block);
            },
            Instruction::GetRate { token, current_block, is_buy, qty, is_src_qty } => {
                accounts::expect_len(accounts, 1)?;
                let a_slab = &accounts[0];

                let data = a_slab.try_borrow_data()?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let rate = zc::engine_ref(&data)?
                    .fetch_rate(&token.to_bytes(), current_block, is_buy, qty, is_src_qty)
                    .map_err(map_rate_error)?;
                set_return_data(&rate.to_le_bytes());
                msg!("GetRate: {} block={} buy={} rate={}", token, current_block, is_buy, rate);
            },
        }
        Ok(())
    }
}

// 8. mod entrypoint
#[cfg(not(feature = "no-entrypoint"))]
#[allow(unsafe_code)]
pub mod entrypoint {
    use solana_program::{
        account_info::AccountInfo, entrypoint, entrypoint::ProgramResult, pubkey::Pubkey,
    };
    use crate::processor;

    entrypoint!(process_instruction);

    fn process_instruction<'a>(
        program_id: &Pubkey,
        accounts: &'a [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        processor::process_instruction(program_id, accounts, instruction_data)
    }
}
