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
    filelist (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        kind -> Text,
    }
}

diesel::joinable!(filelist -> packages (pkg_key));

diesel::allow_tables_to_appear_in_same_query!(packages, filelist,);
