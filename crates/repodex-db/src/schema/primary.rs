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
        checksum_type -> Text,
        summary -> Nullable<Text>,
        description -> Nullable<Text>,
        url -> Nullable<Text>,
        license -> Nullable<Text>,
        vendor -> Nullable<Text>,
        rpm_group -> Nullable<Text>,
        buildhost -> Nullable<Text>,
        sourcerpm -> Nullable<Text>,
        packager -> Nullable<Text>,
        time_file -> BigInt,
        time_build -> BigInt,
        size_package -> BigInt,
        size_installed -> BigInt,
        size_archive -> BigInt,
        location_href -> Text,
        location_base -> Nullable<Text>,
        header_start -> BigInt,
        header_end -> BigInt,
    }
}

diesel::table! {
    provides (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        flags -> Nullable<Text>,
        epoch -> Nullable<Text>,
        version -> Nullable<Text>,
        release -> Nullable<Text>,
        pre -> Bool,
    }
}

diesel::table! {
    requires (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        flags -> Nullable<Text>,
        epoch -> Nullable<Text>,
        version -> Nullable<Text>,
        release -> Nullable<Text>,
        pre -> Bool,
    }
}

diesel::table! {
    conflicts (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        flags -> Nullable<Text>,
        epoch -> Nullable<Text>,
        version -> Nullable<Text>,
        release -> Nullable<Text>,
        pre -> Bool,
    }
}

diesel::table! {
    obsoletes (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        flags -> Nullable<Text>,
        epoch -> Nullable<Text>,
        version -> Nullable<Text>,
        release -> Nullable<Text>,
        pre -> Bool,
    }
}

diesel::table! {
    files (id) {
        id -> Integer,
        pkg_key -> Integer,
        name -> Text,
        kind -> Text,
    }
}

diesel::joinable!(provides -> packages (pkg_key));
diesel::joinable!(requires -> packages (pkg_key));
diesel::joinable!(conflicts -> packages (pkg_key));
diesel::joinable!(obsoletes -> packages (pkg_key));
diesel::joinable!(files -> packages (pkg_key));

diesel::allow_tables_to_appear_in_same_query!(
    packages, provides, requires, conflicts, obsoletes, files,
);
