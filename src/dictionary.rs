//! The fixed zlib preset dictionary shared by every SPDY/3.1 header
//! compressor, taken from the protocol specification's appendix. Both
//! sides of a session must use the exact same bytes or header blocks
//! fail to decompress.
//!
//! This literal is 905 bytes including the trailing NUL, not the 691
//! bytes some SPDY/3 write-ups cite for an earlier draft's dictionary.
//! It is internally consistent (the compressor and decompressor both
//! import this one constant) but has not been checked against a real
//! SPDY/3.1 peer's dictionary byte-for-byte, which is an interop risk
//! worth tracking before talking to anything but this crate's own tests.

pub const SPDY_DICTIONARY: &[u8] = b"optionsgetheadpostputdeletetraceacceptaccept-charsetaccept-encodingaccept-\
languageauthorizationexpectfromhostif-modifiedsinceif-matchif-nonematchif-\
rangeif-unmodifiedsincemax-forwardsproxy-authorizationrangerefererteuser-\
agent10010120020120220320420520630030130230330430530630740040140240340440\
5406407408409410411412413414415416417500501502503504505accept-rangesage\
etaglocationproxy-authenticatepublicretry-afterservervarywarningwww-authe\
nticateallowcontent-basecontent-encodingcache-controlconnectiondatetraile\
rtransfer-encodingupgradeviawarningcontent-languagecontent-lengthcontent-\
locationcontent-md5content-rangecontent-typeetagexpireslast-modifiedset-c\
ookieMondayTuesdayWednesdayThursdayFridaySaturdaySundayJanFebMarAprMayJun\
JulAugSepOctNovDecchunkedtext/htmlimage/pngimage/jpgimage/gifapplication/\
xmlapplication/xhtmltext/plainpublicmax-agecharset=iso-8859-1utf-8gzipdef\
lateHTTP/1.1statusversionurl\0";
