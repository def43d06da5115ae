diesel::table! {
    db_info (rowid) {
        rowid -> Integer,
        dbversion -> Integer,
        checksum -> Text,
    }
}

diesel::table! {
    packages (pkg_key) {
        pkg_key -> Integer,
        pkg_id -> Text,
        name -> Text,
        arch -> Text,
        epoch -> Text,
        version -> Text,
        release -> Text,
    }
}

diesel::table! {
    changelog (id) {
        id -> Integer,
        pkg_key -> Integer,
        author -> Text,
        date -> BigInt,
        text -> Text,
    }
}

diesel::joinable!(changelog -> packages (pkg_key));

diesel::allow_tables_to_appear_in_same_query!(packages, changelog,);
