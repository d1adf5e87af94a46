mod bson;
mod collection;
mod errors;

pub use bson::Id;
pub use collection::{
    ensure_indexes_exist, Coll, MongoCollection, BALLOT_TOKEN_INDEX, VOTER_ELECTION_INDEX,
};
pub use errors::{is_duplicate_key_error, is_duplicate_key_on, DUPLICATE_KEY};
