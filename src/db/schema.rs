table! {
    addresses (id) {
        id -> Int4,
        address -> Text,
    }
}

table! {
    applied_logs (id) {
        id -> Int4,
        transaction_id -> Int4,
        log_index -> Int4,
    }
}

table! {
    config (name) {
        name -> Text,
        value -> Int8,
        transaction_id -> Nullable<Int4>,
    }
}

table! {
    options (id) {
        id -> Int4,
        proposal_id -> Int8,
        on_chain_text -> Text,
        text -> Nullable<Text>,
        votes -> Int8,
        on_chain_id -> Int4,
    }
}

table! {
    proposals (id) {
        id -> Int8,
        proposer_id -> Int4,
        start_timestamp -> Int8,
        end_timestamp -> Int8,
        title -> Text,
        on_chain_description -> Text,
        description -> Nullable<Text>,
        links -> Nullable<Text>,
        reward_token_id -> Nullable<Int4>,
        option_count -> Int4,
        tfuel_pot_amount -> Numeric,
        reward_token_pot_amount -> Numeric,
        voter_count -> Int4,
        cancelled -> Bool,
        transaction_id -> Int4,
    }
}

table! {
    proposers (id) {
        id -> Int4,
        address_id -> Int4,
        proposal_count -> Int4,
        is_active -> Bool,
    }
}

table! {
    tnt20_deposits (id) {
        id -> Int4,
        voter_id -> Int4,
        voting_token_id -> Int4,
        amount -> Numeric,
        transaction_id -> Int4,
    }
}

table! {
    tnt721_deposits (id) {
        id -> Int4,
        token_id -> Int8,
        voting_token_id -> Int4,
        voter_id -> Int4,
        transaction_id -> Int4,
    }
}

table! {
    tokens (id) {
        id -> Int4,
        name -> Nullable<Text>,
        address_id -> Int4,
        voting_power -> Int8,
        lock_address_id -> Int4,
        is_tnt20 -> Bool,
        is_active -> Bool,
        is_reward_token -> Bool,
    }
}

table! {
    transactions (id) {
        id -> Int4,
        block_height -> Int8,
        tx_hash -> Text,
        timestamp -> Int8,
    }
}

table! {
    voters (id) {
        id -> Int4,
        address_id -> Int4,
    }
}

table! {
    votes (id) {
        id -> Int4,
        proposal_id -> Int8,
        voter_id -> Int4,
        option_index -> Int4,
        vote_weight -> Int8,
        claimed_reward -> Bool,
        transaction_id -> Int4,
    }
}

table! {
    voting_tokens (id) {
        id -> Int4,
        proposal_id -> Int8,
        token_id -> Int4,
        voting_power -> Int8,
    }
}

allow_tables_to_appear_in_same_query!(
    addresses,
    applied_logs,
    config,
    options,
    proposals,
    proposers,
    tnt20_deposits,
    tnt721_deposits,
    tokens,
    transactions,
    voters,
    votes,
    voting_tokens,
);
