pub mod time;

/// Alphabet used for generated ids, safe inside urls and cache keys.
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// generate a long id, used for records created by the in-memory backend
pub fn longid() -> String {
    nanoid::nanoid!(21, &ID_ALPHABET)
}

/// generate a short id, used for canvas nodes and edges
pub fn shortid() -> String {
    nanoid::nanoid!(8, &ID_ALPHABET)
}
